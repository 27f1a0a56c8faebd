//! Signaling protocol and per-session orchestration

pub mod controller;
pub mod error;
pub mod message;

pub use controller::SignalingController;
pub use error::SignalingError;
pub use message::{ClientMessage, ServerMessage};
