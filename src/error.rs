//! Transport-level error types
//!
//! Errors that end a client session or stop the server. Per-message failures
//! live in [`crate::signaling::SignalingError`] and never surface here.

use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Result alias for server and connection operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the signaling transport
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket bind/accept failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Outbound message could not be encoded
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// The WebSocket upgrade did not complete in time
    #[error("WebSocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}
