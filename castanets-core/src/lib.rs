//! Discovery, monitoring and service-dispatch protocol logic: the stateful
//! half of the fabric, built on the wire formats in `castanets-wire` and the
//! transport primitives in `castanets-net`.

pub mod discovery;
pub mod model;
pub mod monitor;
pub mod provider;
pub mod service;

pub use model::{ClientState, MonitorSnapshot, ServiceInfo, SharedClientState};
pub use provider::ServiceProvider;
