//! WebRTC bridge for a fixed catalog of live RTSP sources
//!
//! Browsers connect over a WebSocket signaling channel and negotiate one
//! independent peer connection per catalog entry they want to watch. Each
//! client connection gets its own [`SignalingController`] and
//! [`SessionRegistry`]; nothing mutable is shared between sessions except
//! the read-only [`SourceCatalog`].
//!
//! ```text
//!  browser ──ws──► SignalingServer ──spawn──► Connection (one task)
//!                                                │
//!                                  SignalingController
//!                                                │
//!                                  SessionRegistry: stream id ──► StreamConnection
//!                                                                   ├─ PeerConnection
//!                                                                   └─ MediaSource
//! ```
//!
//! The negotiation engine and the media engine are external collaborators,
//! plugged in through the [`MediaBackend`] trait.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod registry;
pub mod sdp;
pub mod server;
pub mod signaling;
pub mod stats;

pub use catalog::{CatalogStatus, SourceCatalog};
pub use engine::{
    ConnectionState, EngineError, IceCandidate, IceServer, MediaBackend, MediaOptions, MediaSource,
    PeerConnection, RtcConfig, RtspTransport, SdpType, SessionDescription,
};
pub use error::{Error, Result};
pub use registry::{SessionRegistry, StateEvent, StreamConnection, StreamId};
pub use sdp::{BandwidthLimit, SdpTransformer};
pub use server::{ServerConfig, SessionConfig, SignalingServer};
pub use signaling::{ClientMessage, ServerMessage, SignalingController, SignalingError};
