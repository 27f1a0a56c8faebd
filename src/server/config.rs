//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::engine::{IceServer, MediaOptions, RtcConfig};
use crate::sdp::BandwidthLimit;

/// Per-session negotiation settings, shared read-only by all sessions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Peer connection configuration (ICE servers)
    pub rtc: RtcConfig,

    /// Media source tuning
    pub media: MediaOptions,

    /// Bandwidth ceiling written into every answer's video section
    pub bandwidth: BandwidthLimit,
}

impl SessionConfig {
    /// Set the bandwidth ceiling
    pub fn bandwidth(mut self, limit: BandwidthLimit) -> Self {
        self.bandwidth = limit;
        self
    }

    /// Set the media tuning
    pub fn media(mut self, media: MediaOptions) -> Self {
        self.media = media;
        self
    }

    /// Replace the ICE server list with a single server
    pub fn ice_server(mut self, url: impl Into<String>) -> Self {
        self.rtc.ice_servers = vec![IceServer {
            urls: vec![url.into()],
        }];
        self
    }
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// WebSocket path clients must request
    pub path: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// WebSocket handshake must complete within this time
    pub connection_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Negotiation settings handed to every session
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            path: "/ws/stream/".to_string(),
            max_connections: 0, // Unlimited
            connection_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set session negotiation settings
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}
