//! Per-viewer outbound queue with drop-newest backpressure
//!
//! A connection has at most one partially written message (`active`) and a
//! bounded FIFO of messages waiting behind it. When nothing is pending, a
//! send is written straight to the socket and only the unwritten tail is
//! kept. When the FIFO is full, the new message is dropped; a slow viewer
//! loses frames instead of growing memory or stalling the reactor.

use std::collections::VecDeque;
use std::io::{self, Write};

use bytes::{Buf, Bytes};

use super::frame::Payload;
use crate::drain;

/// What happened to a message handed to `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the socket in full, nothing retained
    Written,
    /// Partially written; the tail is now the active message
    Pending,
    /// Appended behind already pending data
    Queued,
    /// Queue was full, the message was discarded
    Dropped,
}

/// State of the queue after a flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything has been written
    Idle,
    /// The socket would block with data still pending
    Blocked,
}

/// Bounded outbound queue
#[derive(Debug)]
pub struct OutboundQueue {
    active: Option<Bytes>,
    queue: VecDeque<Bytes>,
    capacity: usize,
    bytes_sent: u64,
    dropped: u64,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` waiting messages
    pub fn new(capacity: usize) -> Self {
        Self {
            active: None,
            queue: VecDeque::with_capacity(capacity),
            capacity,
            bytes_sent: 0,
            dropped: 0,
        }
    }

    /// Nothing active and nothing queued
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty()
    }

    /// Number of waiting messages, not counting the active one
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no messages are waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of waiting messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remaining bytes of the partially written message
    pub fn active(&self) -> Option<&Bytes> {
        self.active.as_ref()
    }

    /// Waiting messages in send order
    pub fn queued(&self) -> impl Iterator<Item = &Bytes> {
        self.queue.iter()
    }

    /// Total bytes written to the socket
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Messages discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Hand a message to the queue
    ///
    /// With nothing pending the message is written inline and only the
    /// unwritten tail is retained. Otherwise it is queued, or dropped when
    /// the queue is at capacity. Dropped payloads are never retained.
    pub fn send<W, P>(&mut self, writer: &mut W, payload: &mut P) -> io::Result<SendOutcome>
    where
        W: Write,
        P: Payload + ?Sized,
    {
        if self.is_idle() {
            let data = payload.bytes();
            let len = data.len();
            let written = drain::write_until_blocked(writer, data)?;
            self.bytes_sent += written as u64;
            if written == len {
                return Ok(SendOutcome::Written);
            }

            let mut tail = payload.retain();
            tail.advance(written);
            self.active = Some(tail);
            return Ok(SendOutcome::Pending);
        }

        if self.queue.len() >= self.capacity {
            self.dropped += 1;
            return Ok(SendOutcome::Dropped);
        }

        self.queue.push_back(payload.retain());
        self.flush(writer)?;
        Ok(SendOutcome::Queued)
    }

    /// Write pending data until the socket would block or nothing is left
    pub fn flush<W: Write>(&mut self, writer: &mut W) -> io::Result<FlushStatus> {
        loop {
            if let Some(active) = self.active.as_mut() {
                let written = drain::write_until_blocked(writer, &active[..])?;
                self.bytes_sent += written as u64;
                active.advance(written);
                if !active.is_empty() {
                    return Ok(FlushStatus::Blocked);
                }
                self.active = None;
            }

            match self.queue.pop_front() {
                Some(next) => self.active = Some(next),
                None => return Ok(FlushStatus::Idle),
            }
        }
    }
}
