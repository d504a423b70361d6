//! Transport primitives shared by every subsystem: a UDP multicast socket
//! for discovery, a thin TCP helper layer, self-signed/no-verify TLS
//! configuration, OS resource sampling and the RTT ping probe.
//!
//! Everything here is a leaf: no dependency on the protocol logic in
//! `castanets-core`.

pub mod ping;
pub mod sampler;
pub mod tcp;
pub mod tls;
pub mod udp;

/// Default multicast TTL used for discovery queries (spec.md §4.3).
pub const DEFAULT_MULTICAST_TTL: u32 = 64;
