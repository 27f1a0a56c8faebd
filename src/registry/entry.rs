//! Stream connection and state event types
//!
//! A [`StreamConnection`] is one bridge between a catalog source and the
//! remote browser: a negotiation handle plus a media handle, both owned.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::engine::{
    ConnectionState, EngineError, IceCandidate, MediaBackend, MediaOptions, MediaSource,
    PeerConnection, RtcConfig, SessionDescription,
};
use crate::sdp::SdpTransformer;
use crate::signaling::SignalingError;

/// Index into the source catalog
pub type StreamId = u32;

/// Per-session sequence number distinguishing successive connections for
/// the same stream id
pub type Generation = u64;

/// Connection-state change posted by the negotiation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEvent {
    pub stream_id: StreamId,
    pub generation: Generation,
    pub state: ConnectionState,
}

/// One negotiated (or negotiating) media bridge
///
/// Release with [`close`](Self::close). A connection dropped without being
/// closed (for example when its session task is aborted) stops the media
/// source on the spot and closes the peer connection on a background task.
pub struct StreamConnection<B: MediaBackend> {
    stream_id: StreamId,
    generation: Generation,
    handles: Option<Handles<B>>,
    state: ConnectionState,
    has_video: bool,
    created_at: Instant,
}

struct Handles<B: MediaBackend> {
    peer: B::Peer,
    media: B::Media,
}

impl<B: MediaBackend> Handles<B> {
    /// Close the peer and stop the media, logging each failure
    async fn release(mut self, stream_id: StreamId) -> bool {
        let mut clean = true;

        if let Err(source) = self.peer.close().await {
            clean = false;
            log_release_failure(stream_id, "peer connection", source);
        }

        if let Err(source) = self.media.stop() {
            clean = false;
            log_release_failure(stream_id, "media source", source);
        }

        clean
    }
}

fn log_release_failure(stream_id: StreamId, resource: &'static str, source: EngineError) {
    let err = SignalingError::ResourceReleaseFailure {
        stream_id,
        resource,
        source,
    };
    tracing::error!(stream_id, error = %err, "Release failed");
}

impl<B: MediaBackend> StreamConnection<B> {
    /// Build a new bridge for `url`
    ///
    /// Creates the peer connection, wires its state observer to `events`,
    /// opens the media source and attaches its video track. On failure every
    /// handle acquired so far is released before returning.
    pub async fn open(
        backend: &B,
        stream_id: StreamId,
        generation: Generation,
        url: &str,
        rtc: &RtcConfig,
        media_options: &MediaOptions,
        events: &mpsc::UnboundedSender<StateEvent>,
    ) -> Result<Self, SignalingError> {
        let mut peer = backend
            .create_peer_connection(rtc)
            .await
            .map_err(|source| SignalingError::NegotiationFailure { stream_id, source })?;

        let tx = events.clone();
        peer.on_connection_state_change(Box::new(move |state| {
            // Send only fails once the session task is gone
            let _ = tx.send(StateEvent {
                stream_id,
                generation,
                state,
            });
        }));

        let media = match backend.open_media(url, media_options).await {
            Ok(media) => media,
            Err(source) => {
                if let Err(e) = peer.close().await {
                    tracing::warn!(stream_id, error = %e, "Failed to close peer connection after media open failure");
                }
                return Err(SignalingError::MediaSourceUnavailable {
                    stream_id,
                    url: url.to_string(),
                    source,
                });
            }
        };

        let has_video = match media.video() {
            Some(track) => {
                if let Err(source) = peer.add_track(track) {
                    Handles::<B> { peer, media }.release(stream_id).await;
                    return Err(SignalingError::NegotiationFailure { stream_id, source });
                }
                true
            }
            None => {
                tracing::warn!(stream_id, url = %url, "Source has no video track");
                false
            }
        };

        Ok(Self {
            stream_id,
            generation,
            handles: Some(Handles { peer, media }),
            state: ConnectionState::New,
            has_video,
            created_at: Instant::now(),
        })
    }

    /// Apply the browser's offer and produce the answer to send back
    ///
    /// The engine's answer is rewritten by `transformer` before it is
    /// committed as the local description.
    pub async fn negotiate(
        &mut self,
        offer_sdp: &str,
        transformer: &SdpTransformer,
    ) -> Result<String, EngineError> {
        let peer = self.peer()?;

        peer.set_remote_description(SessionDescription::offer(offer_sdp))
            .await?;

        let answer = peer.create_answer().await?;
        let sdp = transformer.transform_answer(&answer.sdp);

        peer.set_local_description(SessionDescription::answer(sdp.clone()))
            .await?;

        Ok(peer.local_description().map(|desc| desc.sdp).unwrap_or(sdp))
    }

    /// Forward a remote ICE candidate to the negotiation engine
    pub async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.peer()?.add_ice_candidate(candidate).await
    }

    /// Release both handles
    ///
    /// Each step runs even if an earlier one fails; failures are logged only.
    /// Returns `true` if every step succeeded.
    pub async fn close(mut self) -> bool {
        match self.handles.take() {
            Some(handles) => handles.release(self.stream_id).await,
            None => true,
        }
    }

    fn peer(&mut self) -> Result<&mut B::Peer, EngineError> {
        self.handles
            .as_mut()
            .map(|handles| &mut handles.peer)
            .ok_or_else(|| EngineError::new("connection already released"))
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub(super) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Whether a video track was attached
    pub fn has_video(&self) -> bool {
        self.has_video
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl<B: MediaBackend> Drop for StreamConnection<B> {
    fn drop(&mut self) {
        let Some(Handles { mut peer, mut media }) = self.handles.take() else {
            return;
        };
        let stream_id = self.stream_id;

        tracing::warn!(
            stream_id,
            generation = self.generation,
            "Connection dropped without release"
        );

        if let Err(source) = media.stop() {
            log_release_failure(stream_id, "media source", source);
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(source) = peer.close().await {
                        log_release_failure(stream_id, "peer connection", source);
                    }
                });
            }
            Err(_) => {
                tracing::warn!(stream_id, "No runtime to close peer connection on");
            }
        }
    }
}
