//! `QUERY-SERVICE` / `discovery-response://` wire format.
//!
//! Grounded in `discovery_client.cpp`/`discovery_server.cpp`
//! (`third_party/meerkat/Component/mmDiscovery`): the query is the literal
//! string `QUERY-SERVICE`, the response is a `scheme://key=value&...` echo.
//! A historical `discovery://type=query-response,...` comma-separated form
//! also circulated (a third-party "meerkat" fork diverged); receivers must
//! still accept it per spec.md §9.

use crate::trim_nul;

/// Literal query payload sent by a [`DiscoveryClient`](../../castanets_core/discovery/struct.DiscoveryClient.html).
pub const QUERY_SERVICE: &str = "QUERY-SERVICE";

const RESPONSE_SCHEME: &str = "discovery-response://";
const LEGACY_SCHEME: &str = "discovery://";

/// A parsed discovery response, independent of which wire form produced it.
///
/// `request_from` and `capability` are only ever populated by the current
/// scheme; the legacy comma-separated form never carried them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    pub service_port: u16,
    pub monitor_port: u16,
    pub request_from: Option<String>,
    pub capability: String,
}

/// Builds the query payload, ready for [`with_nul`](crate::with_nul).
#[must_use]
pub fn encode_query() -> String {
    QUERY_SERVICE.to_string()
}

/// Returns `true` if `payload` is (a NUL-terminated, or bare) `QUERY-SERVICE`.
#[must_use]
pub fn is_query(payload: &[u8]) -> bool {
    trim_nul(payload).starts_with(QUERY_SERVICE)
}

/// Builds the current-form response a [`DiscoveryServer`](../../castanets_core/discovery/struct.DiscoveryServer.html)
/// unicasts back to a querying client.
#[must_use]
pub fn encode_response(service_port: u16, monitor_port: u16, request_from: &str, capability: &str) -> String {
    format!(
        "{RESPONSE_SCHEME}service-port={service_port}&monitor-port={monitor_port}&request-from={request_from}&capability={capability}"
    )
}

/// Parses either wire form of a discovery response. Returns `None` for
/// anything that matches neither scheme or is missing its mandatory ports.
#[must_use]
pub fn parse_response(payload: &[u8]) -> Option<DiscoveryResponse> {
    let text = trim_nul(payload);
    if let Some(body) = text.strip_prefix(RESPONSE_SCHEME) {
        parse_current(body)
    } else if let Some(body) = text.strip_prefix(LEGACY_SCHEME) {
        parse_legacy(body)
    } else {
        None
    }
}

fn parse_current(body: &str) -> Option<DiscoveryResponse> {
    let mut service_port = None;
    let mut monitor_port = None;
    let mut request_from = None;
    let mut capability = String::new();

    for pair in body.split('&') {
        let (key, value) = pair.split_once('=')?;
        match key {
            "service-port" => service_port = value.parse().ok(),
            "monitor-port" => monitor_port = value.parse().ok(),
            "request-from" => request_from = Some(value.to_string()),
            "capability" => capability = value.to_string(),
            _ => {}
        }
    }

    Some(DiscoveryResponse {
        service_port: service_port?,
        monitor_port: monitor_port?,
        request_from,
        capability,
    })
}

fn parse_legacy(body: &str) -> Option<DiscoveryResponse> {
    let mut service_port = None;
    let mut monitor_port = None;

    for pair in body.split(',') {
        let (key, value) = pair.split_once(':')?;
        match key {
            "service-port" => service_port = value.parse().ok(),
            "monitor-port" => monitor_port = value.parse().ok(),
            _ => {}
        }
    }

    Some(DiscoveryResponse {
        service_port: service_port?,
        monitor_port: monitor_port?,
        request_from: None,
        capability: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_current_form() {
        let wire = encode_response(9902, 9903, "10.0.0.5", "TEST");
        let parsed = parse_response(wire.as_bytes()).unwrap();
        assert_eq!(
            parsed,
            DiscoveryResponse {
                service_port: 9902,
                monitor_port: 9903,
                request_from: Some("10.0.0.5".to_string()),
                capability: "TEST".to_string(),
            }
        );
    }

    #[test]
    fn accepts_legacy_comma_form() {
        let wire = b"discovery://type=query-response,service-port=9902,monitor-port=9903\0";
        let parsed = parse_response(wire).unwrap();
        assert_eq!(parsed.service_port, 9902);
        assert_eq!(parsed.monitor_port, 9903);
        assert_eq!(parsed.request_from, None);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_response(b"bogus://nothing\0").is_none());
    }

    #[test]
    fn rejects_missing_ports() {
        assert!(parse_response(b"discovery-response://capability=x\0").is_none());
    }

    #[test]
    fn query_detection_ignores_trailing_garbage() {
        assert!(is_query(b"QUERY-SERVICE\0\x01\x02"));
        assert!(!is_query(b"QUERY-MONITORING\0"));
    }
}
