//! TCP-based resource monitoring: the server samples its own CPU/bandwidth
//! and answers `QUERY-MONITORING` with them; the client connects, sends the
//! query, measures RTT with a `ping` probe and folds the reply into a
//! `MonitorSample`.
//!
//! Grounded in `monitor_server.cpp` / `monitor_client.cpp`.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use castanets_net::ping;
use castanets_net::sampler::ResourceSampler;
use castanets_wire::monitor;
use rama_error::{ErrorContext, OpaqueError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, warn};

/// How often the background sampler refreshes its CPU/bandwidth reading
/// (`SERVER_MONITORING_TIME` in the original).
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

const RECV_BUF_SIZE: usize = 512;

/// Answers `QUERY-MONITORING` over TCP with the host's current resource
/// sample (`MonitorServer`/`ServerSocket`).
pub struct MonitorServer {
    listener: TcpListener,
    sampler: Mutex<ResourceSampler>,
}

impl MonitorServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self, OpaqueError> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind monitor server on {addr}"))?;
        Ok(Self { listener, sampler: Mutex::new(ResourceSampler::new()) })
    }

    /// Background task refreshing the CPU-usage rolling average
    /// (`MonitorThread::MainLoop`'s `CheckCpuUsage`; bandwidth and memory
    /// are sampled on demand since they don't need history).
    pub async fn run_sampler(&self) {
        let mut ticker = time::interval(SAMPLE_INTERVAL);
        loop {
            ticker.tick().await;
            self.sampler.lock().expect("sampler mutex poisoned").sample_cpu_usage();
        }
    }

    /// Accept loop: one short-lived connection per monitoring probe.
    pub async fn run(&self) -> Result<(), OpaqueError> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .context("accept monitor connection")?;
            debug!(%peer, "monitor connection accepted");
            if let Err(err) = self.serve_one(stream).await {
                warn!(%peer, error = %err, "monitor connection failed");
            }
        }
    }

    async fn serve_one(&self, mut stream: TcpStream) -> Result<(), OpaqueError> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        let n = stream.read(&mut buf).await.context("read monitor query")?;
        if n == 0 || !monitor::is_query(&buf[..n]) {
            return Ok(());
        }

        let sample = {
            let sampler = self.sampler.lock().expect("sampler mutex poisoned");
            castanets_wire::monitor::MonitorSample {
                usage: sampler.current_usage(),
                cores: sampler.cores(),
                bandwidth: sampler.sample_bandwidth_kbps(),
                freq: sampler.freq_ghz(),
            }
        };

        let reply = monitor::encode_reply(&sample);
        stream
            .write_all(reply.as_bytes())
            .await
            .context("write monitor reply")?;
        Ok(())
    }
}

/// Probes one server for its current resource sample plus a freshly
/// measured RTT (`MonitorClient`).
pub struct MonitorClient {
    addr: SocketAddr,
}

impl MonitorClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Connects, sends `QUERY-MONITORING`, reads the reply and measures RTT
    /// with a handful of ICMP echoes (`MonitorClient::DataSend`/`CheckRtt`).
    pub async fn probe(&self) -> Result<(castanets_wire::monitor::MonitorSample, f64), OpaqueError> {
        let rtt_ms = ping::measure_rtt(self.addr.ip())
            .await
            .context("measure RTT to monitor peer")?
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(-1.0);

        let mut stream = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("connect to monitor server {}", self.addr))?;
        stream
            .write_all(monitor::encode_query().as_bytes())
            .await
            .context("send monitor query")?;

        let mut buf = [0u8; RECV_BUF_SIZE];
        let n = stream.read(&mut buf).await.context("read monitor reply")?;
        let sample = monitor::parse_reply(&buf[..n])
            .context("parse monitor reply")?;

        Ok((sample, rtt_ms))
    }
}
