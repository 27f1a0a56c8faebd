//! Statistics for signaling sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::signaling::SignalingError;

/// Per-session counters
///
/// Owned by the session task, so plain integers suffice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Offers received
    pub offers: u64,
    /// Answers sent back
    pub answers: u64,
    /// Candidates forwarded to a live connection
    pub candidates_added: u64,
    /// Candidates for streams with no live connection
    pub candidates_discarded: u64,
    /// Connections torn down after a Failed transition
    pub failed_connections: u64,
    /// Offers or candidates the engine rejected
    pub negotiation_failures: u64,
    /// Unparseable or unknown messages
    pub malformed_messages: u64,
    /// Messages naming a stream id outside the catalog
    pub invalid_stream_ids: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a message-handling error by kind
    pub fn record_error(&mut self, err: &SignalingError) {
        match err {
            SignalingError::InvalidStreamId { .. } => self.invalid_stream_ids += 1,
            SignalingError::MalformedMessage { .. } | SignalingError::UnknownMessageType { .. } => {
                self.malformed_messages += 1
            }
            SignalingError::NegotiationFailure { .. }
            | SignalingError::MediaSourceUnavailable { .. } => self.negotiation_failures += 1,
            SignalingError::ResourceReleaseFailure { .. } => {}
        }
    }

    /// Total errors of any kind
    pub fn errors(&self) -> u64 {
        self.negotiation_failures + self.malformed_messages + self.invalid_stream_ids
    }
}

/// Server-wide counters, shared by the accept loop and connection tasks
#[derive(Debug)]
pub struct ServerCounters {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,
}

/// Point-in-time copy of [`ServerCounters`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Sessions currently running
    pub active_connections: u64,
    /// Connections refused by the connection limit or a bad handshake
    pub rejected_connections: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}
