//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::capture::Framing;
use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections; extra accepts are closed immediately
    pub max_connections: usize,

    /// Outbound queue depth per viewer
    pub queue_depth: usize,

    /// Receive buffer bound for the request line
    pub max_request_size: usize,

    /// Largest frame accepted from the device
    pub max_frame_size: usize,

    /// Long-lived shared secret
    pub static_token: Vec<u8>,

    /// Frame device (FIFO or pipe)
    pub device: PathBuf,

    /// Framing used by the device stream
    pub framing: Framing,

    /// One-time token FIFO; enables the token ring when set
    pub token_feed: Option<PathBuf>,

    /// One-time token width in bytes
    pub one_time_width: usize,

    /// Number of one-time token slots
    pub one_time_slots: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Stats logging interval; also bounds each readiness wait
    pub stats_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            max_request_size: MAX_REQUEST_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            static_token: Vec::new(),
            device: PathBuf::new(),
            framing: Framing::default(),
            token_feed: None,
            one_time_width: ONE_TIME_TOKEN_WIDTH,
            one_time_slots: ONE_TIME_TOKEN_SLOTS,
            tcp_nodelay: true, // Important for low latency
            stats_interval: None,
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

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set per-viewer queue depth
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set the request line bound
    pub fn max_request_size(mut self, size: usize) -> Self {
        self.max_request_size = size.max(1);
        self
    }

    /// Set the largest accepted frame
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the static token
    pub fn static_token(mut self, token: impl Into<Vec<u8>>) -> Self {
        self.static_token = token.into();
        self
    }

    /// Set the frame device path
    pub fn device(mut self, path: impl Into<PathBuf>) -> Self {
        self.device = path.into();
        self
    }

    /// Set the device framing
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Enable one-time tokens fed from `path`
    pub fn token_feed(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_feed = Some(path.into());
        self
    }

    /// Set one-time token ring geometry
    pub fn one_time_tokens(mut self, width: usize, slots: usize) -> Self {
        self.one_time_width = width;
        self.one_time_slots = slots;
        self
    }

    /// Enable periodic stats logging
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = Some(interval);
        self
    }
}
