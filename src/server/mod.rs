//! WebSocket server front end

pub mod config;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::{Admission, UpgradeHandler, UpgradeRequest};
pub use listener::SyncServer;
