//! Scripted backend for tests
//!
//! Counts every handle it hands out and every release call, and keeps the
//! state observers so tests can force connection-state transitions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    ConnectionState, EngineError, IceCandidate, MediaBackend, MediaOptions, MediaSource,
    PeerConnection, RtcConfig, SessionDescription, StateChangeHandler,
};

pub(crate) const OFFER: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=recvonly\r\n\
a=rtpmap:96 H264/90000\r\n";

pub(crate) const ANSWER: &str = "v=0\r\n\
o=- 3900000000 3900000000 IN IP4 0.0.0.0\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=sendrecv\r\n\
a=rtpmap:96 H264/90000\r\n";

type HandlerSlot = Arc<Mutex<Option<StateChangeHandler>>>;

#[derive(Default)]
pub(crate) struct Counters {
    pub peers_created: AtomicUsize,
    pub peers_closed: AtomicUsize,
    pub media_opened: AtomicUsize,
    pub media_stopped: AtomicUsize,
    pub tracks_added: AtomicUsize,
    pub candidates_added: AtomicUsize,
}

#[derive(Default)]
pub(crate) struct Faults {
    pub remote_description: AtomicBool,
    pub candidate: AtomicBool,
    pub close: AtomicBool,
    pub stop: AtomicBool,
    pub media_open: AtomicBool,
    pub no_video: AtomicBool,
}

#[derive(Default)]
struct Shared {
    counters: Counters,
    faults: Faults,
    handlers: Mutex<Vec<HandlerSlot>>,
    opened_urls: Mutex<Vec<String>>,
}

#[derive(Default)]
pub(crate) struct MockBackend {
    shared: Arc<Shared>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub fn faults(&self) -> &Faults {
        &self.shared.faults
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn live_peers(&self) -> usize {
        let c = self.counters();
        Self::count(&c.peers_created) - Self::count(&c.peers_closed)
    }

    pub fn live_media(&self) -> usize {
        let c = self.counters();
        Self::count(&c.media_opened) - Self::count(&c.media_stopped)
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.shared.opened_urls.lock().unwrap().clone()
    }

    /// Fire a state change on the `index`-th peer connection ever created
    pub fn fire(&self, index: usize, state: ConnectionState) {
        let slot = self.shared.handlers.lock().unwrap()[index].clone();
        fire_slot(&slot, state);
    }

    /// Fire a state change on the most recently created peer connection
    pub fn fire_latest(&self, state: ConnectionState) {
        let slot = self.shared.handlers.lock().unwrap().last().cloned();
        if let Some(slot) = slot {
            fire_slot(&slot, state);
        }
    }
}

fn fire_slot(slot: &HandlerSlot, state: ConnectionState) {
    if let Some(handler) = slot.lock().unwrap().as_ref() {
        handler(state);
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MockTrack;

pub(crate) struct MockPeer {
    shared: Arc<Shared>,
    slot: HandlerSlot,
    remote: Option<SessionDescription>,
    local: Option<SessionDescription>,
}

impl PeerConnection for MockPeer {
    type Track = MockTrack;

    fn on_connection_state_change(&mut self, handler: StateChangeHandler) {
        *self.slot.lock().unwrap() = Some(handler);
    }

    fn add_track(&mut self, _track: MockTrack) -> Result<(), EngineError> {
        self.shared.counters.tracks_added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_remote_description(&mut self, desc: SessionDescription) -> Result<(), EngineError> {
        if self.shared.faults.remote_description.load(Ordering::SeqCst) {
            return Err(EngineError::new("invalid offer"));
        }
        fire_slot(&self.slot, ConnectionState::Connecting);
        self.remote = Some(desc);
        Ok(())
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, EngineError> {
        match self.remote {
            Some(_) => Ok(SessionDescription::answer(ANSWER)),
            None => Err(EngineError::new("no remote description")),
        }
    }

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), EngineError> {
        self.local = Some(desc);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local.clone()
    }

    async fn add_ice_candidate(&mut self, _candidate: IceCandidate) -> Result<(), EngineError> {
        if self.shared.faults.candidate.load(Ordering::SeqCst) {
            return Err(EngineError::new("malformed candidate"));
        }
        self.shared.counters.candidates_added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        self.shared.counters.peers_closed.fetch_add(1, Ordering::SeqCst);
        fire_slot(&self.slot, ConnectionState::Closed);
        if self.shared.faults.close.load(Ordering::SeqCst) {
            return Err(EngineError::new("close failed"));
        }
        Ok(())
    }
}

pub(crate) struct MockMedia {
    shared: Arc<Shared>,
}

impl MediaSource for MockMedia {
    type Track = MockTrack;

    fn video(&self) -> Option<MockTrack> {
        if self.shared.faults.no_video.load(Ordering::SeqCst) {
            None
        } else {
            Some(MockTrack)
        }
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.shared.counters.media_stopped.fetch_add(1, Ordering::SeqCst);
        if self.shared.faults.stop.load(Ordering::SeqCst) {
            return Err(EngineError::new("stop failed"));
        }
        Ok(())
    }
}

impl MediaBackend for MockBackend {
    type Peer = MockPeer;
    type Media = MockMedia;

    async fn create_peer_connection(&self, _config: &RtcConfig) -> Result<MockPeer, EngineError> {
        let slot: HandlerSlot = Arc::new(Mutex::new(None));
        self.shared.handlers.lock().unwrap().push(slot.clone());
        self.shared.counters.peers_created.fetch_add(1, Ordering::SeqCst);

        Ok(MockPeer {
            shared: self.shared.clone(),
            slot,
            remote: None,
            local: None,
        })
    }

    async fn open_media(&self, url: &str, _options: &MediaOptions) -> Result<MockMedia, EngineError> {
        if self.shared.faults.media_open.load(Ordering::SeqCst) {
            return Err(EngineError::new(format!("connection refused: {}", url)));
        }
        self.shared.opened_urls.lock().unwrap().push(url.to_string());
        self.shared.counters.media_opened.fetch_add(1, Ordering::SeqCst);

        Ok(MockMedia {
            shared: self.shared.clone(),
        })
    }
}
