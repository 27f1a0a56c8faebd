//! Source catalog
//!
//! The fixed, ordered list of RTSP source addresses a client may select from.
//! It is built once at startup and shared read-only by every session; a
//! stream id is simply an index into it.

use serde::Serialize;

use crate::registry::StreamId;
use crate::signaling::SignalingError;

/// Immutable, ordered list of source addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCatalog {
    sources: Vec<String>,
}

/// Static descriptor served by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogStatus {
    /// First source address, empty if the catalog is empty
    pub stream_url: String,
    /// `"active"` or `"empty"`
    pub status: &'static str,
}

impl SourceCatalog {
    /// Create a catalog from an ordered list of source addresses
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a catalog exposing the same source `count` times
    ///
    /// Useful for load testing several peers against one camera.
    pub fn repeated(url: impl Into<String>, count: usize) -> Self {
        Self {
            sources: vec![url.into(); count],
        }
    }

    /// Number of selectable stream ids
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Source address for a stream id
    pub fn get(&self, stream_id: StreamId) -> Option<&str> {
        self.sources.get(stream_id as usize).map(String::as_str)
    }

    /// Validate a stream id as received on the wire
    ///
    /// Valid iff `0 <= raw < len()`.
    pub fn resolve(&self, raw: i64) -> Result<StreamId, SignalingError> {
        self.lookup(raw).map(|(id, _)| id)
    }

    /// Validate a wire stream id and return it with its source address
    pub fn lookup(&self, raw: i64) -> Result<(StreamId, &str), SignalingError> {
        StreamId::try_from(raw)
            .ok()
            .and_then(|id| self.get(id).map(|url| (id, url)))
            .ok_or(SignalingError::InvalidStreamId {
                stream_id: raw,
                count: self.sources.len(),
            })
    }

    /// Iterate over `(stream id, address)` pairs in catalog order
    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &str)> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, url)| (i as StreamId, url.as_str()))
    }

    /// Descriptor for catalog introspection
    pub fn status(&self) -> CatalogStatus {
        match self.sources.first() {
            Some(url) => CatalogStatus {
                stream_url: url.clone(),
                status: "active",
            },
            None => CatalogStatus {
                stream_url: String::new(),
                status: "empty",
            },
        }
    }
}
