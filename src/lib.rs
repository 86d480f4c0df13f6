//! MJPEG over HTTP fan-out server
//!
//! Reads JPEG frames from one capture device and streams them as
//! `multipart/x-mixed-replace` to every authenticated viewer. Everything runs
//! on a single `mio` reactor thread; each frame is rendered once and shared
//! between viewers through `bytes::Bytes`, and slow viewers drop frames
//! instead of stalling the others.
//!
//! Viewers authenticate with a credential in the query string:
//!
//! ```text
//! GET /stream?<static token or one-time token> HTTP/1.1
//! ```

pub mod auth;
pub mod broadcast;
pub mod capture;
pub(crate) mod drain;
pub mod error;
pub mod protocol;
pub mod server;
pub mod stats;

pub use error::{Error, ProtocolError, Result, SourceError};
pub use server::{Server, ServerConfig, StopHandle};
pub use stats::ServerStats;
