//! `verify-token://`, `verify-done://` and `service-request://` wire format.
//!
//! Grounded in `service_client.cpp`/`service_server.cpp`. These three
//! schemes ride over the TLS-wrapped TCP connection opened by
//! `castanets-core::service`.

use crate::trim_nul;

const VERIFY_TOKEN_SCHEME: &str = "verify-token://";
const VERIFY_DONE_SCHEME: &str = "verify-done://";
const SERVICE_REQUEST_SCHEME: &str = "service-request://";

/// What a received payload turned out to be, on the service channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMessage {
    VerifyToken(String),
    VerifyDone,
    ServiceRequest(Vec<String>),
    /// Anything not matching a known scheme; spec.md §4.5 says ignore it.
    Unknown,
}

/// Parses one NUL-terminated payload received on a service connection.
#[must_use]
pub fn parse(payload: &[u8]) -> ServiceMessage {
    let text = trim_nul(payload);
    if let Some(token) = text.strip_prefix(VERIFY_TOKEN_SCHEME) {
        ServiceMessage::VerifyToken(token.to_string())
    } else if text.starts_with(VERIFY_DONE_SCHEME) {
        ServiceMessage::VerifyDone
    } else if let Some(body) = text.strip_prefix(SERVICE_REQUEST_SCHEME) {
        ServiceMessage::ServiceRequest(split_args(body))
    } else {
        ServiceMessage::Unknown
    }
}

/// Splits a `service-request://` body on `&`, matching the original's
/// `strtok(packet_string, "&")` which never yields empty tokens.
fn split_args(body: &str) -> Vec<String> {
    body.split('&')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[must_use]
pub fn encode_verify_token(token: &str) -> String {
    format!("{VERIFY_TOKEN_SCHEME}{token}")
}

#[must_use]
pub fn encode_verify_done() -> String {
    VERIFY_DONE_SCHEME.to_string()
}

/// Joins `args` with `&`, exactly as `CServiceClient`'s dispatch call does.
#[must_use]
pub fn encode_service_request(args: &[String]) -> String {
    format!("{SERVICE_REQUEST_SCHEME}{}", args.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verify_token() {
        assert_eq!(
            parse(b"verify-token://abc123\0"),
            ServiceMessage::VerifyToken("abc123".to_string())
        );
    }

    #[test]
    fn parses_verify_done() {
        assert_eq!(parse(b"verify-done://\0"), ServiceMessage::VerifyDone);
    }

    #[test]
    fn parses_service_request_args() {
        let msg = parse(b"service-request://--type=renderer&--flag=x\0");
        assert_eq!(
            msg,
            ServiceMessage::ServiceRequest(vec!["--type=renderer".to_string(), "--flag=x".to_string()])
        );
    }

    #[test]
    fn empty_service_request_yields_no_args() {
        assert_eq!(parse(b"service-request://\0"), ServiceMessage::ServiceRequest(vec![]));
    }

    #[test]
    fn unknown_scheme_is_ignored() {
        assert_eq!(parse(b"gibberish://x\0"), ServiceMessage::Unknown);
    }

    #[test]
    fn round_trips_request_encoding() {
        let args = vec!["a".to_string(), "b".to_string()];
        let wire = encode_service_request(&args);
        assert_eq!(wire, "service-request://a&b");
        assert_eq!(parse(wire.as_bytes()), ServiceMessage::ServiceRequest(args));
    }
}
