pub mod client;
pub mod daemonize;
pub mod server;

pub use client::{ClientCallbacks, ClientRunner};
pub use daemonize::daemonize;
pub use server::{ServerCallbacks, ServerRunner};
