//! On-the-wire string formats for the discovery, monitoring and service
//! dispatch protocols.
//!
//! Every payload on the wire is NUL-terminated ASCII. Receivers must stop at
//! the first NUL byte and ignore anything after it; senders always append
//! one. [`trim_nul`] is the single place that rule is implemented.

pub mod discovery;
pub mod monitor;
pub mod service;

/// Returns the leading slice of `bytes` up to (but not including) the first
/// NUL byte, interpreted as ASCII/UTF-8.
///
/// Payloads that arrive without a NUL (truncated reads, non-conforming
/// peers) are returned in full; callers decide whether that is malformed.
#[must_use]
pub fn trim_nul(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).unwrap_or("")
}

/// Appends the terminating NUL byte a wire sender must always include.
#[must_use]
pub fn with_nul(mut s: String) -> Vec<u8> {
    s.push('\0');
    s.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_nul_stops_at_first_nul() {
        assert_eq!(trim_nul(b"hello\0garbage"), "hello");
        assert_eq!(trim_nul(b"no-nul-here"), "no-nul-here");
        assert_eq!(trim_nul(b"\0"), "");
    }

    #[test]
    fn with_nul_appends_terminator() {
        assert_eq!(with_nul("abc".to_string()), b"abc\0".to_vec());
    }
}
