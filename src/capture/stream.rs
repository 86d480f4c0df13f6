//! Frames decoded from a non-blocking byte stream
//!
//! The device path is expected to be a FIFO or pipe carrying either a raw
//! MJPEG stream (`ffmpeg -f mjpeg`) or length-prefixed JPEG images.

use std::io::{self, Read};

use bytes::{Buf, Bytes, BytesMut};
use mio::event::Source;
use mio::{Interest, Registry, Token};

use super::FrameSource;
use crate::drain;
use crate::error::SourceError;
use crate::protocol::constants::MAX_FRAME_SIZE;

/// Start of image marker
const SOI: [u8; 2] = [0xFF, 0xD8];

/// End of image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Bytes requested from the stream per read
const READ_CHUNK: usize = 16 * 1024;

/// How frames are delimited on the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Each frame runs from `FF D8` to `FF D9` inclusive
    #[default]
    JpegMarkers,
    /// A 4-byte big-endian length followed by that many bytes
    LengthPrefixed,
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jpeg" | "mjpeg" => Ok(Framing::JpegMarkers),
            "length-prefixed" => Ok(Framing::LengthPrefixed),
            other => Err(format!("unknown framing: {}", other)),
        }
    }
}

/// Incremental frame splitter
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    max_frame_size: usize,
    buf: BytesMut,
    /// Offset already searched for an end marker
    scanned: usize,
}

impl FrameDecoder {
    /// Create a decoder rejecting frames above `max_frame_size`
    pub fn new(framing: Framing, max_frame_size: usize) -> Self {
        Self {
            framing,
            max_frame_size,
            buf: BytesMut::with_capacity(READ_CHUNK),
            scanned: 0,
        }
    }

    /// Append raw stream bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet part of a returned frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Split off the next complete frame
    pub fn decode(&mut self) -> Result<Option<Bytes>, SourceError> {
        match self.framing {
            Framing::JpegMarkers => self.decode_markers(),
            Framing::LengthPrefixed => self.decode_length_prefixed(),
        }
    }

    fn decode_markers(&mut self) -> Result<Option<Bytes>, SourceError> {
        match find(&self.buf, &SOI) {
            Some(start) => self.buf.advance(start),
            None => {
                // Keep a trailing 0xFF, it may be the first half of a marker
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let len = self.buf.len();
                self.buf.advance(len - keep);
                self.scanned = 0;
                return Ok(None);
            }
        }

        let from = self.scanned.max(SOI.len());
        match find(&self.buf[from..], &EOI) {
            Some(pos) => {
                let size = from + pos + EOI.len();
                if size > self.max_frame_size {
                    return Err(SourceError::FrameTooLarge {
                        size,
                        max: self.max_frame_size,
                    });
                }
                self.scanned = 0;
                Ok(Some(self.buf.split_to(size).freeze()))
            }
            None if self.buf.len() > self.max_frame_size => Err(SourceError::FrameTooLarge {
                size: self.buf.len(),
                max: self.max_frame_size,
            }),
            None => {
                // Resume one byte early in case the marker straddles reads
                self.scanned = self.buf.len().saturating_sub(1);
                Ok(None)
            }
        }
    }

    fn decode_length_prefixed(&mut self) -> Result<Option<Bytes>, SourceError> {
        loop {
            if self.buf.len() < 4 {
                return Ok(None);
            }
            let size = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
                as usize;
            if size > self.max_frame_size {
                return Err(SourceError::FrameTooLarge {
                    size,
                    max: self.max_frame_size,
                });
            }
            if self.buf.len() < 4 + size {
                return Ok(None);
            }

            self.buf.advance(4);
            if size == 0 {
                continue;
            }
            return Ok(Some(self.buf.split_to(size).freeze()));
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Frame source reading a non-blocking stream such as a FIFO
pub struct StreamSource<R = mio::unix::pipe::Receiver> {
    reader: R,
    decoder: FrameDecoder,
    enabled: bool,
    chunk: Box<[u8]>,
}

impl<R> StreamSource<R>
where
    R: Read + Source,
{
    /// Wrap a non-blocking reader
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(framing, MAX_FRAME_SIZE),
            enabled: false,
            chunk: vec![0; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Set the largest accepted frame
    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.decoder.max_frame_size = max;
        self
    }

    /// Whether the source is registered with the poller
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<R> FrameSource for StreamSource<R>
where
    R: Read + Source,
{
    fn enable(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        if !self.enabled {
            registry.register(&mut self.reader, token, Interest::READABLE)?;
            self.enabled = true;
            tracing::debug!("Frame source enabled");
        }
        Ok(())
    }

    fn disable(&mut self, registry: &Registry) -> io::Result<()> {
        if self.enabled {
            registry.deregister(&mut self.reader)?;
            self.enabled = false;
            tracing::debug!("Frame source disabled");
        }
        Ok(())
    }

    fn try_read(&mut self) -> Result<Option<Bytes>, SourceError> {
        loop {
            if let Some(frame) = self.decoder.decode()? {
                return Ok(Some(frame));
            }

            let chunk = &mut self.chunk;
            let reader = &mut self.reader;
            match drain::attempt(|| reader.read(&mut chunk[..]))? {
                Some(0) => return Err(SourceError::Closed),
                Some(n) => self.decoder.extend(&self.chunk[..n]),
                None => return Ok(None),
            }
        }
    }
}

impl<R> std::fmt::Debug for StreamSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("framing", &self.decoder.framing)
            .field("buffered", &self.decoder.buffered())
            .field("enabled", &self.enabled)
            .finish()
    }
}
