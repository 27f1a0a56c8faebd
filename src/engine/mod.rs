//! External collaborator seams
//!
//! The bridge does not implement WebRTC or RTSP itself. A [`MediaBackend`]
//! supplies two kinds of exclusively owned handles per stream:
//!
//! - a [`PeerConnection`] (negotiation engine: SDP offer/answer, ICE,
//!   connection-state notifications)
//! - a [`MediaSource`] (an opened, tuned RTSP source producing decoded tracks)
//!
//! The backend itself is process-wide and shared by every session.

use std::future::Future;

use serde::{Deserialize, Serialize};

pub mod options;

#[cfg(test)]
pub(crate) mod mock;

pub use options::{MediaOptions, RtspTransport};

/// Error reported by a negotiation or media engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Peer connection state as reported by the negotiation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    /// Transient loss of connectivity, may recover
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Session description kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A typed SDP document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Remote ICE candidate, as sent by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    pub candidate: String,
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServer>,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer {
                urls: vec!["stun:stun.l.google.com:19302".into()],
            }],
        }
    }
}

/// Callback invoked by the engine on every connection-state change
///
/// May be called from any thread; implementations must not block.
pub type StateChangeHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// Negotiation handle for one media bridge
pub trait PeerConnection: Send + 'static {
    /// Decoded track type this engine can send
    type Track: Send;

    /// Register the connection-state observer, replacing any previous one
    fn on_connection_state_change(&mut self, handler: StateChangeHandler);

    /// Attach an outgoing track
    fn add_track(&mut self, track: Self::Track) -> Result<(), EngineError>;

    fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn create_answer(&mut self) -> impl Future<Output = Result<SessionDescription, EngineError>> + Send;

    fn set_local_description(
        &mut self,
        desc: SessionDescription,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Local description as committed, including anything the engine added
    fn local_description(&self) -> Option<SessionDescription>;

    fn add_ice_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Release the engine instance; aborts any in-flight negotiation
    fn close(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// Opened media source for one media bridge
pub trait MediaSource: Send + 'static {
    type Track: Send;

    /// Decoded video track, if the source has one
    fn video(&self) -> Option<Self::Track>;

    /// Stop decoding and release the source connection
    fn stop(&mut self) -> Result<(), EngineError>;
}

/// Process-wide factory for negotiation and media handles
pub trait MediaBackend: Send + Sync + 'static {
    type Peer: PeerConnection;
    type Media: MediaSource<Track = <Self::Peer as PeerConnection>::Track>;

    fn create_peer_connection(
        &self,
        config: &RtcConfig,
    ) -> impl Future<Output = Result<Self::Peer, EngineError>> + Send;

    fn open_media(
        &self,
        url: &str,
        options: &MediaOptions,
    ) -> impl Future<Output = Result<Self::Media, EngineError>> + Send;
}
