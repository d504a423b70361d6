pub mod cli;
pub mod config;
pub mod ini;

pub use cli::{ClientArgs, ServerArgs};
pub use config::{ClientConfig, Presence, ServerConfig};
pub use ini::Ini;
