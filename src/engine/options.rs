//! Media source tuning
//!
//! Defaults aim at the lowest glass-to-glass delay over a bounded link:
//! no reorder buffer, small jitter and decode queues, capped frame rate.

use std::collections::BTreeMap;
use std::time::Duration;

/// RTSP transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtspTransport {
    Tcp,
    Udp,
}

impl RtspTransport {
    fn as_str(&self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
        }
    }
}

/// Options passed to the media engine when opening a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOptions {
    /// Interleaved TCP avoids UDP loss on lossy links
    pub transport: RtspTransport,

    /// Socket read/connect timeout
    pub socket_timeout: Duration,

    /// Disable demuxer input buffering
    pub no_buffer: bool,

    /// Ask decoders for low-delay output
    pub low_delay: bool,

    /// Receive buffer size in bytes
    pub buffer_size: usize,

    /// RTP reorder queue length (0 = no reordering)
    pub reorder_queue_size: usize,

    /// Upper bound on demuxer delay
    pub max_delay: Duration,

    /// Decode queue length in packets
    pub thread_queue_size: usize,

    /// Frame rate cap
    pub fps: u32,
}

impl Default for MediaOptions {
    fn default() -> Self {
        Self {
            transport: RtspTransport::Tcp,
            socket_timeout: Duration::from_secs(3),
            no_buffer: true,
            low_delay: true,
            buffer_size: 512_000,
            reorder_queue_size: 0,
            max_delay: Duration::from_millis(500),
            thread_queue_size: 512,
            fps: 15,
        }
    }
}

impl MediaOptions {
    /// Set the frame rate cap
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the socket timeout
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set the RTSP transport
    pub fn transport(mut self, transport: RtspTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Render as the key/value option map demuxer-style engines expect
    ///
    /// Durations are in microseconds.
    pub fn to_options(&self) -> BTreeMap<&'static str, String> {
        let mut opts = BTreeMap::new();
        opts.insert("rtsp_transport", self.transport.as_str().to_string());
        opts.insert("stimeout", self.socket_timeout.as_micros().to_string());
        if self.no_buffer {
            opts.insert("fflags", "nobuffer".to_string());
        }
        if self.low_delay {
            opts.insert("flags", "low_delay".to_string());
        }
        opts.insert("buffer_size", self.buffer_size.to_string());
        opts.insert("reorder_queue_size", self.reorder_queue_size.to_string());
        opts.insert("max_delay", self.max_delay.as_micros().to_string());
        opts.insert("thread_queue_size", self.thread_queue_size.to_string());
        opts.insert("fps", self.fps.to_string());
        opts
    }
}
