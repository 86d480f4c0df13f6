//! Frame capture
//!
//! The reactor only sees the `FrameSource` trait. It enables the source when
//! the first viewer connects and disables it when the last one leaves, so an
//! idle server never pulls frames from the device.

pub mod fifo;
pub mod stream;

use std::io;

use bytes::Bytes;
use mio::{Registry, Token};

use crate::error::SourceError;

pub use stream::{FrameDecoder, Framing, StreamSource};

/// A producer of JPEG frames
///
/// `enable` and `disable` must be idempotent. `try_read` is called
/// repeatedly after a readiness event until it returns `Ok(None)`; any error
/// ends the reactor run.
pub trait FrameSource {
    /// Start delivering readiness events under `token`
    fn enable(&mut self, registry: &Registry, token: Token) -> io::Result<()>;

    /// Stop delivering readiness events
    fn disable(&mut self, registry: &Registry) -> io::Result<()>;

    /// Next complete frame, or `None` if the source would block
    fn try_read(&mut self) -> Result<Option<Bytes>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn enable(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        (**self).enable(registry, token)
    }

    fn disable(&mut self, registry: &Registry) -> io::Result<()> {
        (**self).disable(registry)
    }

    fn try_read(&mut self) -> Result<Option<Bytes>, SourceError> {
        (**self).try_read()
    }
}
