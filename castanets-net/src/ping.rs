//! Round-trip-time probing for the monitor client, ported from
//! `monitor_client.cpp`'s `MonitorClient::CheckRtt`/`ParseRtt`: it shells
//! out to the system `ping` binary rather than opening a raw ICMP socket
//! (which would need `CAP_NET_RAW`), and scrapes the average out of the
//! summary line `ping` prints on exit.
//!
//! The original synchronously redirected `ping`'s output to a temp file and
//! re-opened it; here `tokio::process::Command` captures stdout directly
//! without blocking the async runtime.

use std::net::IpAddr;
use std::time::Duration;

use rama_error::{ErrorContext, OpaqueError};
use tokio::process::Command;

const PING_INTERVAL_SECS: &str = "0.2";
const PING_COUNT: &str = "5";

/// Probes `addr` with a handful of ICMP echoes and returns the average
/// round-trip time. `None` means `ping` ran but its output could not be
/// parsed (spec.md §4.4.2: caller falls back to the previous RTT value).
pub async fn measure_rtt(addr: IpAddr) -> Result<Option<Duration>, OpaqueError> {
    let output = Command::new("ping")
        .args(["-i", PING_INTERVAL_SECS, "-c", PING_COUNT, &addr.to_string()])
        .output()
        .await
        .context("spawn ping subprocess")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_average_rtt_ms(&stdout).map(|ms| Duration::from_secs_f64(ms / 1000.0)))
}

/// Parses the `rtt min/avg/max/mdev = a/b/c/d ms` summary line `ping`
/// prints on exit, returning the average (`b`) in milliseconds.
fn parse_average_rtt_ms(stdout: &str) -> Option<f64> {
    let line = stdout.lines().find(|l| l.contains("min/avg/max"))?;
    let values = line.split('=').nth(1)?;
    let values = values.split_whitespace().next()?;
    let mut parts = values.split('/');
    parts.next()?;
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_iputils_summary_line() {
        let stdout = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.\n\
            64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=1.23 ms\n\
            \n\
            --- 10.0.0.1 ping statistics ---\n\
            5 packets transmitted, 5 received, 0% packet loss, time 812ms\n\
            rtt min/avg/max/mdev = 0.980/1.234/1.500/0.150 ms\n";
        assert_eq!(parse_average_rtt_ms(stdout), Some(1.234));
    }

    #[test]
    fn missing_summary_line_yields_none() {
        assert_eq!(parse_average_rtt_ms("ping: unknown host\n"), None);
    }
}
