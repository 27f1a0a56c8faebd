//! Signaling error taxonomy
//!
//! None of these end a session. The controller logs them, counts them and,
//! where a stream id is known, releases that stream defensively.

use crate::engine::EngineError;
use crate::registry::StreamId;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalingError {
    /// Stream id outside the catalog; rejected without touching any state
    #[error("invalid stream id {stream_id} (catalog has {count} sources)")]
    InvalidStreamId { stream_id: i64, count: usize },

    /// Payload is not JSON or lacks a required field
    #[error("malformed message: {reason}")]
    MalformedMessage {
        reason: String,
        stream_id: Option<i64>,
    },

    /// Well-formed message with an unsupported `type`
    #[error("unknown message type {message_type:?}")]
    UnknownMessageType {
        message_type: String,
        stream_id: Option<i64>,
    },

    /// Engine rejected an offer, answer or candidate
    #[error("negotiation failed for stream {stream_id}: {source}")]
    NegotiationFailure {
        stream_id: StreamId,
        source: EngineError,
    },

    /// Source could not be opened
    #[error("source {url} unavailable for stream {stream_id}: {source}")]
    MediaSourceUnavailable {
        stream_id: StreamId,
        url: String,
        source: EngineError,
    },

    /// Closing a handle failed; only ever logged
    #[error("failed to release {resource} of stream {stream_id}: {source}")]
    ResourceReleaseFailure {
        stream_id: StreamId,
        resource: &'static str,
        source: EngineError,
    },
}

impl SignalingError {
    /// Stream to release after this error, if any
    ///
    /// Invalid ids never reach the registry, so they have nothing to clean up.
    pub fn cleanup_target(&self) -> Option<StreamId> {
        match self {
            SignalingError::MalformedMessage { stream_id, .. }
            | SignalingError::UnknownMessageType { stream_id, .. } => {
                stream_id.and_then(|id| StreamId::try_from(id).ok())
            }
            SignalingError::NegotiationFailure { stream_id, .. }
            | SignalingError::MediaSourceUnavailable { stream_id, .. } => Some(*stream_id),
            SignalingError::InvalidStreamId { .. }
            | SignalingError::ResourceReleaseFailure { .. } => None,
        }
    }
}
