//! `QUERY-MONITORING` / `USAGE=...;CORES=...;BANDWIDTH=...;FREQ=...;` wire format.
//!
//! Grounded in `monitor_server.cpp`/`monitor_client.cpp`. The original parser
//! expected the fields in a fixed order; spec.md §9 specifies the
//! reimplementation as order-independent (split on `;`, then on `=`), which
//! is what [`parse_reply`] does.

use crate::trim_nul;

pub const QUERY_MONITORING: &str = "QUERY-MONITORING";

/// A server-reported resource sample, as carried on the wire.
///
/// RTT is deliberately absent: it is never sent by the server, only filled
/// in locally by the probing client (see `castanets-core::monitor`).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonitorSample {
    pub usage: f64,
    pub cores: u32,
    pub bandwidth: f64,
    pub freq: f64,
}

/// Returns `true` if `payload` is the literal `QUERY-MONITORING` query.
#[must_use]
pub fn is_query(payload: &[u8]) -> bool {
    trim_nul(payload).starts_with(QUERY_MONITORING)
}

#[must_use]
pub fn encode_query() -> String {
    QUERY_MONITORING.to_string()
}

/// Encodes a sample using the exact `KEY=VALUE;` grammar of the original,
/// field order included — though [`parse_reply`] does not require that
/// order on receive.
#[must_use]
pub fn encode_reply(sample: &MonitorSample) -> String {
    format!(
        "USAGE={:.6};CORES={};BANDWIDTH={:.6};FREQ={:.6};",
        sample.usage, sample.cores, sample.bandwidth, sample.freq
    )
}

/// Parses a `KEY=VALUE;KEY=VALUE;...` reply, independent of field order.
/// Unknown keys are ignored; missing mandatory keys yield `None`.
#[must_use]
pub fn parse_reply(payload: &[u8]) -> Option<MonitorSample> {
    let text = trim_nul(payload);

    let mut usage = None;
    let mut cores = None;
    let mut bandwidth = None;
    let mut freq = None;

    for field in text.split(';') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key {
            "USAGE" => usage = value.parse().ok(),
            "CORES" => cores = value.parse().ok(),
            "BANDWIDTH" => bandwidth = value.parse().ok(),
            "FREQ" => freq = value.parse().ok(),
            _ => {}
        }
    }

    Some(MonitorSample {
        usage: usage?,
        cores: cores?,
        bandwidth: bandwidth?,
        freq: freq?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_finite_samples() {
        let sample = MonitorSample {
            usage: 0.25,
            cores: 8,
            bandwidth: 1_000_000.0,
            freq: 2.4,
        };
        let wire = encode_reply(&sample);
        assert_eq!(wire, "USAGE=0.250000;CORES=8;BANDWIDTH=1000000.000000;FREQ=2.400000;");
        assert_eq!(parse_reply(wire.as_bytes()), Some(sample));
    }

    #[test]
    fn parse_is_order_independent() {
        let shuffled = b"FREQ=2.400000;CORES=8;USAGE=0.250000;BANDWIDTH=1000000.000000;\0";
        let parsed = parse_reply(shuffled).unwrap();
        assert_eq!(parsed.cores, 8);
        assert_eq!(parsed.usage, 0.25);
    }

    #[test]
    fn missing_field_is_rejected() {
        assert!(parse_reply(b"USAGE=0.1;CORES=4;\0").is_none());
    }
}
