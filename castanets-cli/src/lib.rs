//! Shared plumbing for the `castanets-serverd` / `castanets-clientd`
//! binaries: exit-code mapping, tracing init, and the standalone default
//! callbacks used when no embedder supplies its own.

pub mod callbacks;
pub mod error;
pub mod trace;
