//! Session registry implementation
//!
//! Owned by exactly one session task, so no locking is needed: every
//! operation takes `&mut self` and runs to completion before the next one.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::future::Future;

use crate::engine::{ConnectionState, MediaBackend};

use super::entry::{Generation, StreamConnection, StreamId};

/// Stream id → connection map for one client session
///
/// Invariants:
/// - at most one [`StreamConnection`] per stream id
/// - an id is in the connected set only while its connection exists and is
///   in [`ConnectionState::Connected`]
pub struct SessionRegistry<B: MediaBackend> {
    streams: HashMap<StreamId, StreamConnection<B>>,
    connected: HashSet<StreamId>,
    next_generation: Generation,
}

impl<B: MediaBackend> SessionRegistry<B> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            connected: HashSet::new(),
            next_generation: 1,
        }
    }

    /// Replace whatever exists for `stream_id` with a freshly built connection
    ///
    /// Any existing connection is fully released before `factory` runs, so
    /// two live connections for the same id never overlap. The factory gets
    /// the generation to stamp on the new connection's state events. If it
    /// fails nothing is stored.
    pub async fn create<F, Fut, E>(
        &mut self,
        stream_id: StreamId,
        factory: F,
    ) -> Result<&mut StreamConnection<B>, E>
    where
        F: FnOnce(Generation) -> Fut,
        Fut: Future<Output = Result<StreamConnection<B>, E>>,
    {
        if self.release(stream_id).await {
            tracing::debug!(stream_id, "Replaced existing stream connection");
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let conn = factory(generation).await?;
        debug_assert_eq!(conn.stream_id(), stream_id);
        debug_assert_eq!(conn.generation(), generation);

        tracing::info!(stream_id, generation, "Stream connection created");

        Ok(match self.streams.entry(stream_id) {
            Entry::Occupied(mut slot) => {
                slot.insert(conn);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(conn),
        })
    }

    /// Look up a live connection
    pub fn get(&self, stream_id: StreamId) -> Option<&StreamConnection<B>> {
        self.streams.get(&stream_id)
    }

    pub fn get_mut(&mut self, stream_id: StreamId) -> Option<&mut StreamConnection<B>> {
        self.streams.get_mut(&stream_id)
    }

    /// Generation of the live connection for `stream_id`
    pub fn generation_of(&self, stream_id: StreamId) -> Option<Generation> {
        self.streams.get(&stream_id).map(StreamConnection::generation)
    }

    /// Release a connection
    ///
    /// No-op for unknown ids. The entry leaves the map and the connected set
    /// before its handles are closed, so nothing can reach a half-closed
    /// connection. Returns `true` if something was released.
    pub async fn release(&mut self, stream_id: StreamId) -> bool {
        let Some(conn) = self.streams.remove(&stream_id) else {
            return false;
        };
        self.connected.remove(&stream_id);

        let generation = conn.generation();
        let uptime = conn.uptime();
        let clean = conn.close().await;

        tracing::info!(
            stream_id,
            generation,
            clean,
            uptime_secs = uptime.as_secs(),
            "Stream connection released"
        );

        true
    }

    /// Release every connection
    ///
    /// Iterates a snapshot of the ids. Returns the number released.
    pub async fn release_all(&mut self) -> usize {
        let ids: Vec<StreamId> = self.streams.keys().copied().collect();
        let mut released = 0;

        for stream_id in ids {
            if self.release(stream_id).await {
                released += 1;
            }
        }

        released
    }

    /// Record that a connection reached [`ConnectionState::Connected`]
    ///
    /// Returns `false` if no connection exists for `stream_id`.
    pub fn mark_connected(&mut self, stream_id: StreamId) -> bool {
        match self.streams.get_mut(&stream_id) {
            Some(conn) => {
                conn.set_state(ConnectionState::Connected);
                self.connected.insert(stream_id);
                true
            }
            None => false,
        }
    }

    /// Record any state other than a release trigger
    ///
    /// Leaving `Connected` drops the id from the connected set.
    pub fn update_state(&mut self, stream_id: StreamId, state: ConnectionState) -> bool {
        if state == ConnectionState::Connected {
            return self.mark_connected(stream_id);
        }

        match self.streams.get_mut(&stream_id) {
            Some(conn) => {
                conn.set_state(state);
                self.connected.remove(&stream_id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, stream_id: StreamId) -> bool {
        self.streams.contains_key(&stream_id)
    }

    pub fn is_connected(&self, stream_id: StreamId) -> bool {
        self.connected.contains(&stream_id)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Live stream ids in ascending order
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<B: MediaBackend> Default for SessionRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}
