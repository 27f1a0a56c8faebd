//! WebSocket signaling server

pub mod config;
pub mod connection;
pub mod listener;

pub use config::{ServerConfig, SessionConfig};
pub use connection::Connection;
pub use listener::SignalingServer;
