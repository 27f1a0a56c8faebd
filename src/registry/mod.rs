//! Per-session stream registry
//!
//! Every client session owns one [`SessionRegistry`], mapping the stream ids
//! the client asked for to live [`StreamConnection`]s. The registry is the
//! only owner of the negotiation and media handles, so dropping or draining
//! it releases everything the session ever opened.
//!
//! # Lifecycle
//!
//! ```text
//!   offer(id) ──► create(id) ──► release(id) if present ──► factory(generation)
//!                                                                  │
//!   StateEvent{id, generation, Connected} ──► mark_connected(id)   │
//!   StateEvent{id, generation, Failed}    ──► release(id)          ▼
//!   disconnect                            ──► release_all()   StreamConnection
//! ```
//!
//! Engines report state changes from arbitrary threads. The observer only
//! posts a [`StateEvent`] to the session task; the generation stamped on it
//! lets the session ignore events from connections it already replaced.

pub mod entry;
pub mod store;

pub use entry::{Generation, StateEvent, StreamConnection, StreamId};
pub use store::SessionRegistry;
