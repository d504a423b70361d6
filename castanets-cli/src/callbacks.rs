//! Standalone default callbacks (spec.md §6.4): the original wires these up
//! through a D-Bus/JNI front door that is out of scope here, but a runnable
//! binary still needs *some* implementation to hand the runners, so these
//! are the defaults both daemons fall back to absent an embedder.

use std::process::Command;
use std::sync::Arc;

use castanets_core::discovery::GetCapability;
use castanets_core::service::{GetToken, Spawn, VerifyToken};
use rama_error::OpaqueError;

/// Generates one random per-process token and hands out the same value
/// every time it's called, matching a process that authenticates with a
/// single long-lived secret rather than minting one per peer.
pub fn standalone_get_token() -> GetToken {
    let token: String = {
        use rand::Rng;
        let mut rng = rand::rng();
        (0..32).map(|_| rng.sample(rand::distr::Alphanumeric) as char).collect()
    };
    Arc::new(move || token.clone())
}

/// Accepts any non-empty token; there's no registry of known peers to
/// check against without an embedder-supplied allowlist.
pub fn standalone_verify_token() -> VerifyToken {
    Arc::new(|token: &str| !token.is_empty())
}

/// No capability string to advertise without an embedder.
pub fn standalone_get_capability() -> GetCapability {
    Arc::new(|| String::new())
}

/// Launches `exec_path` with the rewritten argv, logging (not propagating)
/// spawn failures so one bad request can't take the server down
/// (`ServiceLauncher::LaunchRenderer`).
pub fn standalone_spawn(exec_path: String) -> Spawn {
    Arc::new(move |argv: Vec<String>| -> Result<(), OpaqueError> {
        if exec_path.is_empty() {
            return Err(OpaqueError::from_display(
                "no service exec-path configured, cannot spawn requested service",
            ));
        }
        Command::new(&exec_path)
            .args(&argv)
            .spawn()
            .map(|_child| ())
            .map_err(|err| OpaqueError::from_display(format!("spawn {exec_path}: {err}")))
    })
}
