//! Signaling wire messages
//!
//! JSON text frames, tagged by a `type` field.
//!
//! Inbound:
//! - `{"type": "offer", "streamId": 2, "sdp": "..."}`
//! - `{"type": "ice", "streamId": 2, "candidate": {"sdpMid": "0", "sdpMLineIndex": 0, "candidate": "..."}}`
//!
//! Outbound:
//! - `{"type": "stream_count", "count": 8}`
//! - `{"type": "answer", "streamId": 2, "sdp": "..."}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::IceCandidate;
use crate::registry::StreamId;

use super::error::SignalingError;

/// Message sent by the browser
///
/// Stream ids stay as raw wire integers here; they are validated against the
/// catalog by the handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Offer {
        #[serde(rename = "streamId")]
        stream_id: i64,
        sdp: String,
    },
    Ice {
        #[serde(rename = "streamId")]
        stream_id: i64,
        candidate: IceCandidate,
    },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Decode a text frame
    ///
    /// Unknown types are rejected here, before any handler runs. Errors carry
    /// the `streamId` when one could be read so the caller can clean up.
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SignalingError::MalformedMessage {
                reason: e.to_string(),
                stream_id: None,
            })?;

        let stream_id = value.get("streamId").and_then(Value::as_i64);

        let Some(message_type) = value.get("type").and_then(Value::as_str) else {
            return Err(SignalingError::MalformedMessage {
                reason: "missing message type".into(),
                stream_id,
            });
        };

        match ClientMessage::deserialize(&value) {
            Ok(ClientMessage::Unknown) => Err(SignalingError::UnknownMessageType {
                message_type: message_type.to_string(),
                stream_id,
            }),
            Ok(msg) => Ok(msg),
            Err(e) => Err(SignalingError::MalformedMessage {
                reason: e.to_string(),
                stream_id,
            }),
        }
    }

    /// Raw stream id, if the message has one
    pub fn stream_id(&self) -> Option<i64> {
        match self {
            ClientMessage::Offer { stream_id, .. } | ClientMessage::Ice { stream_id, .. } => {
                Some(*stream_id)
            }
            ClientMessage::Unknown => None,
        }
    }
}

/// Message sent to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Number of selectable stream ids, sent once on connect
    StreamCount { count: usize },
    /// Negotiated answer for one stream
    Answer {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
        sdp: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
