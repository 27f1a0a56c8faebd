//! Per-session signaling controller
//!
//! Turns inbound signaling messages and connection-state events into
//! registry operations and outbound replies. One controller per client
//! connection, driven by that connection's task only.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::catalog::SourceCatalog;
use crate::engine::{ConnectionState, IceCandidate, MediaBackend};
use crate::registry::{SessionRegistry, StateEvent, StreamConnection, StreamId};
use crate::sdp::SdpTransformer;
use crate::server::SessionConfig;
use crate::stats::SessionStats;

use super::error::SignalingError;
use super::message::{ClientMessage, ServerMessage};

/// Signaling state machine for one client session
pub struct SignalingController<B: MediaBackend> {
    session_id: u64,
    backend: Arc<B>,
    catalog: Arc<SourceCatalog>,
    config: Arc<SessionConfig>,
    transformer: SdpTransformer,
    registry: SessionRegistry<B>,
    events: mpsc::UnboundedSender<StateEvent>,
    stats: SessionStats,
}

impl<B: MediaBackend> SignalingController<B> {
    /// Create a controller with an empty registry
    ///
    /// Returns the receiving end of the state-event queue. The owning task
    /// must feed every event back through [`Self::handle_state_event`].
    pub fn new(
        session_id: u64,
        backend: Arc<B>,
        catalog: Arc<SourceCatalog>,
        config: Arc<SessionConfig>,
    ) -> (Self, mpsc::UnboundedReceiver<StateEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transformer = SdpTransformer::new(config.bandwidth);

        let controller = Self {
            session_id,
            backend,
            catalog,
            config,
            transformer,
            registry: SessionRegistry::new(),
            events,
            stats: SessionStats::new(),
        };

        (controller, rx)
    }

    /// Greeting sent as soon as the channel opens
    pub fn on_connect(&self) -> ServerMessage {
        tracing::info!(
            session_id = self.session_id,
            streams = self.catalog.len(),
            "Signaling session opened"
        );
        ServerMessage::StreamCount {
            count: self.catalog.len(),
        }
    }

    /// Handle one inbound text frame
    ///
    /// Never fails: errors are logged and trigger a defensive release of the
    /// affected stream. Returns the reply to send, if any.
    pub async fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        let result = match ClientMessage::parse(text) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => reply,
            Err(err) => {
                self.on_error(err).await;
                None
            }
        }
    }

    /// Dispatch a decoded message
    pub async fn handle_message(
        &mut self,
        msg: ClientMessage,
    ) -> Result<Option<ServerMessage>, SignalingError> {
        match msg {
            ClientMessage::Offer { stream_id, sdp } => {
                self.handle_offer(stream_id, &sdp).await.map(Some)
            }
            ClientMessage::Ice {
                stream_id,
                candidate,
            } => self.handle_ice(stream_id, candidate).await.map(|()| None),
            ClientMessage::Unknown => Err(SignalingError::UnknownMessageType {
                message_type: "unknown".into(),
                stream_id: None,
            }),
        }
    }

    /// Build (or rebuild) the bridge for a stream and negotiate it
    async fn handle_offer(&mut self, raw_id: i64, sdp: &str) -> Result<ServerMessage, SignalingError> {
        let (stream_id, url) = self.catalog.lookup(raw_id)?;
        self.stats.offers += 1;

        tracing::debug!(session_id = self.session_id, stream_id, url = %url, "Offer received");

        let backend = &*self.backend;
        let config = &*self.config;
        let events = &self.events;
        let conn = self
            .registry
            .create(stream_id, |generation| {
                StreamConnection::open(
                    backend,
                    stream_id,
                    generation,
                    url,
                    &config.rtc,
                    &config.media,
                    events,
                )
            })
            .await?;

        let answer = conn
            .negotiate(sdp, &self.transformer)
            .await
            .map_err(|source| SignalingError::NegotiationFailure { stream_id, source })?;

        self.stats.answers += 1;
        tracing::info!(
            session_id = self.session_id,
            stream_id,
            generation = conn.generation(),
            "Answer ready"
        );

        Ok(ServerMessage::Answer {
            stream_id,
            sdp: answer,
        })
    }

    /// Forward a remote candidate; candidates for unknown streams are dropped
    async fn handle_ice(&mut self, raw_id: i64, candidate: IceCandidate) -> Result<(), SignalingError> {
        let conn = StreamId::try_from(raw_id)
            .ok()
            .and_then(|id| self.registry.get_mut(id));

        let Some(conn) = conn else {
            self.stats.candidates_discarded += 1;
            tracing::debug!(
                session_id = self.session_id,
                stream_id = raw_id,
                "Discarding candidate for stream without connection"
            );
            return Ok(());
        };

        let stream_id = conn.stream_id();
        conn.add_ice_candidate(candidate)
            .await
            .map_err(|source| SignalingError::NegotiationFailure { stream_id, source })?;

        self.stats.candidates_added += 1;
        Ok(())
    }

    /// Apply a connection-state change posted by a negotiation engine
    ///
    /// Events from connections that were since replaced or released are
    /// ignored.
    pub async fn handle_state_event(&mut self, event: StateEvent) {
        let StateEvent {
            stream_id,
            generation,
            state,
        } = event;

        if self.registry.generation_of(stream_id) != Some(generation) {
            tracing::debug!(
                session_id = self.session_id,
                stream_id,
                generation,
                state = %state,
                "Ignoring state change from stale connection"
            );
            return;
        }

        tracing::info!(
            session_id = self.session_id,
            stream_id,
            state = %state,
            "Connection state changed"
        );

        match state {
            ConnectionState::Failed => {
                self.stats.failed_connections += 1;
                self.registry.release(stream_id).await;
            }
            ConnectionState::Connected => {
                self.registry.mark_connected(stream_id);
            }
            other => {
                self.registry.update_state(stream_id, other);
            }
        }
    }

    /// Release everything the session owns
    ///
    /// Returns the number of connections released.
    pub async fn on_disconnect(&mut self) -> usize {
        let released = self.registry.release_all().await;

        tracing::info!(
            session_id = self.session_id,
            released,
            offers = self.stats.offers,
            answers = self.stats.answers,
            errors = self.stats.errors(),
            "Signaling session closed"
        );

        released
    }

    async fn on_error(&mut self, err: SignalingError) {
        self.stats.record_error(&err);

        match &err {
            SignalingError::InvalidStreamId { .. }
            | SignalingError::MalformedMessage { .. }
            | SignalingError::UnknownMessageType { .. } => {
                tracing::warn!(session_id = self.session_id, error = %err, "Rejected signaling message");
            }
            _ => {
                tracing::error!(session_id = self.session_id, error = %err, "Signaling failure");
            }
        }

        if let Some(stream_id) = err.cleanup_target() {
            self.registry.release(stream_id).await;
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn registry(&self) -> &SessionRegistry<B> {
        &self.registry
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}
