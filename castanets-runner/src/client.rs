//! Client-side process lifecycle: discover servers, keep a persistent
//! `ServiceClient` per candidate, refresh monitor samples on a fixed tick,
//! and expose `dispatch` as the seam an external front door calls into.
//!
//! Grounded in `client_runner.cpp`'s `ClientRunner::Run`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use castanets_config::ClientConfig;
use castanets_core::discovery::DiscoveryClient;
use castanets_core::model::generate_key;
use castanets_core::monitor::MonitorClient;
use castanets_core::provider::ServiceProvider;
use castanets_core::service::{GetToken, ServiceClient, VerifyToken};
use castanets_net::tls::SHUTDOWN_JOIN_TIMEOUT;
use rama_error::OpaqueError;
use tokio::sync::Mutex;
use tokio::time;
use tokio_graceful::Shutdown;
use tracing::{debug, info, warn};

/// How often a query is sent and the monitor/invalidation sweep runs
/// (`__OSAL_Sleep(1000)` in the original's main loop).
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Client-side callbacks (spec.md §6.4): every discovered server gets its
/// own `ServiceClient` driven by the same token pair.
pub struct ClientCallbacks {
    pub get_token: GetToken,
    pub verify_token: VerifyToken,
}

/// Owns the discovery loop, the `ServiceProvider` registry, and one
/// `ServiceClient` per candidate server currently known.
pub struct ClientRunner {
    discovery: DiscoveryClient,
    provider: Arc<ServiceProvider>,
    peers: Mutex<HashMap<u64, Arc<ServiceClient>>>,
    callbacks: ClientCallbacks,
}

impl ClientRunner {
    pub async fn bind(config: &ClientConfig, callbacks: ClientCallbacks) -> Result<Arc<Self>, OpaqueError> {
        let discovery = DiscoveryClient::bind(
            config.multicast_address,
            config.multicast_port,
            config.self_discovery_enabled,
        )
        .await?;
        Ok(Arc::new(Self {
            discovery,
            provider: Arc::new(ServiceProvider::new()),
            peers: Mutex::new(HashMap::new()),
            callbacks,
        }))
    }

    /// Exposes the registry so an embedder can inspect candidate counts
    /// without going through `dispatch`.
    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    /// Runs the discovery-response receive loop and the query/sweep tick
    /// loop until shutdown, joining with a bounded timeout.
    pub async fn run(self: Arc<Self>) -> Result<(), OpaqueError> {
        let shutdown = Shutdown::default();

        let receiver = self.clone();
        shutdown.spawn_task_fn(async move |_guard| {
            receiver.receive_loop().await;
        });

        let ticker = self.clone();
        shutdown.spawn_task_fn(async move |_guard| {
            ticker.tick_loop().await;
        });

        shutdown
            .shutdown_with_limit(SHUTDOWN_JOIN_TIMEOUT)
            .await
            .map_err(|_| OpaqueError::from_display("client runner shutdown timed out"))
    }

    /// Picks the best currently connected server (`ChooseBestService`) and
    /// sends it a `service-request://` over its persistent connection
    /// (`RequestRunService`'s `DataSend` call in the original).
    pub async fn dispatch(&self, args: &[String]) -> Result<(), OpaqueError> {
        let Some((address, service_port)) = self.provider.choose_best() else {
            return Err(OpaqueError::from_display(
                "no connected service available to dispatch to",
            ));
        };
        let key = generate_key(address, service_port as u32);
        let peers = self.peers.lock().await;
        let client = peers.get(&key).ok_or_else(|| {
            OpaqueError::from_display("chosen service has no active connection")
        })?;
        client.dispatch(args).await
    }

    async fn receive_loop(self: Arc<Self>) {
        loop {
            match self.discovery.recv_response().await {
                Ok(Some(discovered)) => self.handle_discovered(discovered).await,
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "discovery receive failed");
                    return;
                }
            }
        }
    }

    async fn handle_discovered(self: &Arc<Self>, discovered: castanets_core::discovery::Discovered) {
        let now = now_ms();
        let Some((key, state)) = self.provider.add_service_info(
            discovered.address,
            discovered.response.service_port,
            discovered.response.monitor_port,
            discovered.response.capability.clone(),
            now,
        ) else {
            return;
        };

        let addr = SocketAddr::new(discovered.address, discovered.response.service_port);
        match ServiceClient::connect(
            addr,
            self.callbacks.get_token.clone(),
            self.callbacks.verify_token.clone(),
            state,
        )
        .await
        {
            Ok(client) => {
                self.peers.lock().await.insert(key, client);
                info!(%addr, "connecting to discovered service");
            }
            Err(err) => warn!(%addr, error = %err, "failed to connect to discovered service"),
        }
    }

    async fn tick_loop(self: Arc<Self>) {
        let mut ticker = time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = self.discovery.send_query().await {
                warn!(error = %err, "failed to send discovery query");
            }
            self.sweep().await;
        }
    }

    /// Probes every known server for a fresh monitor sample regardless of
    /// handshake state, then drops expired entries — mirroring the
    /// original's per-tick `GetServiceInfo` loop followed by
    /// `InvalidateServiceList`.
    async fn sweep(&self) {
        let now = now_ms();
        for (key, address, monitor_port) in self.provider.snapshot_targets() {
            let provider = self.provider.clone();
            let addr = SocketAddr::new(address, monitor_port);
            tokio::spawn(async move {
                match MonitorClient::new(addr).probe().await {
                    Ok((sample, rtt_ms)) => {
                        provider.update_service_info(key, rtt_ms, sample, now);
                    }
                    Err(err) => debug!(%addr, error = %err, "monitor probe failed"),
                }
            });
        }

        self.provider.invalidate(now);
        let live_keys: std::collections::HashSet<u64> =
            self.provider.snapshot_targets().into_iter().map(|(key, _, _)| key).collect();
        self.peers.lock().await.retain(|key, _| live_keys.contains(key));
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
