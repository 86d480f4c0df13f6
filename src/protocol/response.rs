//! Server responses and frame framing

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;

/// Multipart preamble sent once a credential is accepted
pub const WELCOME: &[u8] = concat!(
    "HTTP/1.0 200 OK\r\n",
    "Access-Control-Allow-Origin: *\r\n",
    "Connection: close\r\n",
    "Server: mjpeg-fanout/",
    env!("CARGO_PKG_VERSION"),
    "\r\n",
    "Cache-Control: no-store, no-cache, must-revalidate, pre-check=0, post-check=0, max-age=0\r\n",
    "Pragma: no-cache\r\n",
    "Expires: Mon, 3 Jan 2000 12:34:56 GMT\r\n",
    "Content-Type: multipart/x-mixed-replace;boundary=",
    boundary!(),
    "\r\n",
    "\r\n",
    "--",
    boundary!(),
    "\r\n",
)
.as_bytes();

/// Response sent before closing a connection with a bad credential
pub const UNAUTHORIZED: &[u8] = concat!(
    "HTTP/1.1 401 Unauthorized\r\n",
    "Connection: close\r\n",
    "\r\n",
    "not authorized\r\n",
    "\r\n",
)
.as_bytes();

/// Trailer closing every frame part
const END_FRAME: &[u8] = concat!("\r\n--", boundary!(), "\r\n").as_bytes();

/// Wall-clock capture time with microsecond resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    pub secs: u64,
    /// Sub-second part in microseconds
    pub micros: u32,
}

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: since_epoch.as_secs(),
            micros: since_epoch.subsec_micros(),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

/// Render one multipart part for `jpeg` into `out`, replacing its contents
pub fn encode_frame(out: &mut BytesMut, jpeg: &[u8], timestamp: Timestamp) {
    out.clear();
    out.reserve(jpeg.len() + 128);

    // BytesMut grows on demand, formatting into it cannot fail
    let _ = write!(
        out,
        "Content-Type: image/jpeg\r\nContent-Length: {}\r\nX-Timestamp: {}\r\n\r\n",
        jpeg.len(),
        timestamp
    );
    out.extend_from_slice(jpeg);
    out.extend_from_slice(END_FRAME);
}
