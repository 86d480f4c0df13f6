//! One-time token ring
//!
//! The ring is a flat byte map of `slots * stride` bytes, where
//! `stride = width + 1` leaves room for the producer's separator (usually
//! `\n`). Feed bytes are written positionally with no regard for slot
//! boundaries, wrapping to offset zero at the end of the map; the producer
//! is responsible for keeping its writes slot-aligned.
//!
//! ```text
//!  slot 0                 slot 1                 slot 2
//! ┌──────────────────────┬──────────────────────┬────────── ...
//! │ t o k e n . . . . \n │ 0 0 0 0 0 0 0 0 0 \n │ ...
//! └──────────────────────┴──────────────────────┴────────── ...
//!                          ^ cleared after use
//! ```

use std::io::{self, Read};

use crate::drain;

/// Result of draining the token feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Feed would block; more bytes may arrive later
    Drained { bytes: usize },
    /// Producer closed the feed
    Closed { bytes: usize },
}

/// Fixed-size ring of single-use tokens
#[derive(Debug, Clone)]
pub struct OneTimeTokens {
    map: Vec<u8>,
    width: usize,
    stride: usize,
    write_pos: usize,
}

impl OneTimeTokens {
    /// Create an empty ring of `slots` tokens, each `width` bytes wide
    pub fn new(width: usize, slots: usize) -> Self {
        let stride = width + 1;
        Self {
            map: vec![0; stride * slots],
            width,
            stride,
            write_pos: 0,
        }
    }

    /// Width of a single token
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of slots
    pub fn slots(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.map.len() / self.stride
        }
    }

    /// Total byte size of the slot map
    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    /// Current feed write offset
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Append bytes to the ring as if they arrived from the feed
    pub fn write(&mut self, mut bytes: &[u8]) {
        if self.map.is_empty() {
            return;
        }
        while !bytes.is_empty() {
            if self.write_pos == self.map.len() {
                self.write_pos = 0;
            }
            let n = bytes.len().min(self.map.len() - self.write_pos);
            self.map[self.write_pos..self.write_pos + n].copy_from_slice(&bytes[..n]);
            self.write_pos += n;
            bytes = &bytes[n..];
        }
    }

    /// Read every immediately available byte from `reader` into the ring
    pub fn ingest<R: Read>(&mut self, reader: &mut R) -> io::Result<FeedStatus> {
        let mut total = 0;
        if self.map.is_empty() {
            return Ok(FeedStatus::Drained { bytes: 0 });
        }

        loop {
            if self.write_pos == self.map.len() {
                self.write_pos = 0;
            }
            let pos = self.write_pos;
            match drain::attempt(|| reader.read(&mut self.map[pos..]))? {
                Some(0) => return Ok(FeedStatus::Closed { bytes: total }),
                Some(n) => {
                    self.write_pos += n;
                    total += n;
                }
                None => return Ok(FeedStatus::Drained { bytes: total }),
            }
        }
    }

    /// Consume the token equal to `presented`, if any slot holds it
    ///
    /// Slots are scanned in order. A matching slot is zeroed in the same
    /// step, so the token can never be accepted twice. Zeroed slots never
    /// match.
    pub fn take(&mut self, presented: &[u8]) -> bool {
        if presented.len() != self.width || self.width == 0 {
            return false;
        }

        for offset in (0..self.map.len()).step_by(self.stride) {
            let slot = &mut self.map[offset..offset + self.width];
            if slot.iter().all(|&b| b == 0) {
                continue;
            }
            if *slot == *presented {
                slot.fill(0);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drain::testing::MockSocket;

    const TOKEN_A: &[u8] = b"aaaaaaaaaaaaaaaaaaaa";
    const TOKEN_B: &[u8] = b"bbbbbbbbbbbbbbbbbbbb";
    const TOKEN_C: &[u8] = b"cccccccccccccccccccc";

    fn line(token: &[u8]) -> Vec<u8> {
        let mut v = token.to_vec();
        v.push(b'\n');
        v
    }

    #[test]
    fn test_geometry() {
        let ring = OneTimeTokens::new(20, 20);
        assert_eq!(ring.width(), 20);
        assert_eq!(ring.slots(), 20);
        assert_eq!(ring.capacity(), 420);
    }

    #[test]
    fn test_token_matches_once() {
        let mut ring = OneTimeTokens::new(20, 4);
        ring.write(&line(TOKEN_A));

        assert!(ring.take(TOKEN_A));
        assert!(!ring.take(TOKEN_A));
    }

    #[test]
    fn test_token_matches_again_after_refill() {
        let mut ring = OneTimeTokens::new(20, 1);
        ring.write(&line(TOKEN_A));
        assert!(ring.take(TOKEN_A));

        // Only slot wraps back to offset zero
        ring.write(&line(TOKEN_A));
        assert!(ring.take(TOKEN_A));
    }

    #[test]
    fn test_wrong_width_never_matches() {
        let mut ring = OneTimeTokens::new(20, 2);
        ring.write(&line(TOKEN_A));
        assert!(!ring.take(&TOKEN_A[..19]));
        assert!(ring.take(TOKEN_A));
    }

    #[test]
    fn test_cleared_slot_never_matches() {
        let mut ring = OneTimeTokens::new(20, 2);
        assert!(!ring.take(&[0u8; 20]));
    }

    #[test]
    fn test_write_wraps_positionally() {
        let mut ring = OneTimeTokens::new(20, 2);
        ring.write(&line(TOKEN_A));
        ring.write(&line(TOKEN_B));
        assert_eq!(ring.write_pos(), 42);

        // Third token overwrites slot 0
        ring.write(&line(TOKEN_C));
        assert_eq!(ring.write_pos(), 21);
        assert!(!ring.take(TOKEN_A));
        assert!(ring.take(TOKEN_B));
        assert!(ring.take(TOKEN_C));
    }

    #[test]
    fn test_ingest_until_would_block() {
        let mut ring = OneTimeTokens::new(20, 3);
        let mut feed = MockSocket::default();
        feed.feed(&line(TOKEN_A));
        feed.feed(&line(TOKEN_B));

        let status = ring.ingest(&mut feed).unwrap();
        assert_eq!(status, FeedStatus::Drained { bytes: 42 });
        assert!(ring.take(TOKEN_B));
        assert!(ring.take(TOKEN_A));
    }

    #[test]
    fn test_ingest_wraps_across_reads() {
        let mut ring = OneTimeTokens::new(20, 2);
        let mut feed = MockSocket::default();
        for token in [TOKEN_A, TOKEN_B, TOKEN_C] {
            feed.feed(&line(token));
        }

        let status = ring.ingest(&mut feed).unwrap();
        assert_eq!(status, FeedStatus::Drained { bytes: 63 });
        assert_eq!(ring.write_pos(), 21);
        assert!(ring.take(TOKEN_C));
        assert!(!ring.take(TOKEN_A));
    }

    #[test]
    fn test_ingest_reports_closed_feed() {
        let mut ring = OneTimeTokens::new(20, 2);
        let mut feed = MockSocket {
            eof: true,
            ..Default::default()
        };
        feed.feed(&line(TOKEN_A));

        let status = ring.ingest(&mut feed).unwrap();
        assert_eq!(status, FeedStatus::Closed { bytes: 21 });
        assert!(ring.take(TOKEN_A));
    }
}
