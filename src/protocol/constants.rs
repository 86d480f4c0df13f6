//! Protocol and resource limit constants

/// Multipart boundary separating frames on the wire
pub const BOUNDARY: &str = boundary!();

/// Largest request line accepted before a terminator must appear
pub const MAX_REQUEST_SIZE: usize = 1000;

/// Largest JPEG accepted from a frame source
pub const MAX_FRAME_SIZE: usize = 200_000;

/// Default concurrent connection cap
pub const DEFAULT_MAX_CONNECTIONS: usize = 30;

/// Default per-connection outbound queue depth
pub const DEFAULT_QUEUE_DEPTH: usize = 5;

/// Width of a one-time token in bytes
pub const ONE_TIME_TOKEN_WIDTH: usize = 20;

/// Number of one-time token slots in the ring
pub const ONE_TIME_TOKEN_SLOTS: usize = 20;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;
