//! Shared frame buffers
//!
//! `BroadcastBuffer` borrows the rendered frame and only promotes it to a
//! reference-counted `Bytes` when a viewer has to keep it past the inline
//! write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

/// Counts shared frame allocations and their releases
///
/// `live()` is the number of frames still referenced by some viewer queue.
#[derive(Debug, Default)]
pub struct FrameLedger {
    allocated: AtomicU64,
    released: AtomicU64,
}

impl FrameLedger {
    /// Create a new ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared allocations made so far
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Shared allocations freed so far
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Shared allocations still alive
    pub fn live(&self) -> u64 {
        self.allocated().saturating_sub(self.released())
    }
}

/// Owner of a shared frame allocation; reports its release to the ledger
struct TrackedFrame {
    data: Box<[u8]>,
    ledger: Arc<FrameLedger>,
}

impl TrackedFrame {
    fn new(data: &[u8], ledger: &Arc<FrameLedger>) -> Self {
        ledger.allocated.fetch_add(1, Ordering::Relaxed);
        Self {
            data: data.into(),
            ledger: Arc::clone(ledger),
        }
    }
}

impl AsRef<[u8]> for TrackedFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for TrackedFrame {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::Relaxed);
    }
}

/// Something a connection can send
///
/// `bytes()` is used for the inline write attempt; `retain()` is only called
/// when some of it has to outlive that attempt.
pub trait Payload {
    /// The bytes to send
    fn bytes(&self) -> &[u8];

    /// A handle that keeps the bytes alive in a queue
    fn retain(&mut self) -> Bytes;
}

impl Payload for &'static [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn retain(&mut self) -> Bytes {
        Bytes::from_static(*self)
    }
}

/// One rendered frame being fanned out to all viewers
pub struct BroadcastBuffer<'a> {
    framed: &'a [u8],
    shared: Option<Bytes>,
    ledger: &'a Arc<FrameLedger>,
}

impl<'a> BroadcastBuffer<'a> {
    /// Wrap a rendered frame; nothing is allocated yet
    pub fn new(framed: &'a [u8], ledger: &'a Arc<FrameLedger>) -> Self {
        Self {
            framed,
            shared: None,
            ledger,
        }
    }

    /// Length of the rendered frame
    pub fn len(&self) -> usize {
        self.framed.len()
    }

    /// Whether the rendered frame is empty
    pub fn is_empty(&self) -> bool {
        self.framed.is_empty()
    }

    /// Whether the shared allocation has been made
    pub fn is_shared(&self) -> bool {
        self.shared.is_some()
    }
}

impl Payload for BroadcastBuffer<'_> {
    fn bytes(&self) -> &[u8] {
        self.framed
    }

    fn retain(&mut self) -> Bytes {
        let ledger = self.ledger;
        let framed = self.framed;
        self.shared
            .get_or_insert_with(|| Bytes::from_owner(TrackedFrame::new(framed, ledger)))
            .clone()
    }
}

impl std::fmt::Debug for BroadcastBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastBuffer")
            .field("len", &self.framed.len())
            .field("shared", &self.is_shared())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_allocation_until_retained() {
        let ledger = Arc::new(FrameLedger::new());
        let data = vec![7u8; 64];
        let buffer = BroadcastBuffer::new(&data, &ledger);

        assert!(!buffer.is_shared());
        assert_eq!(buffer.bytes(), &data[..]);
        drop(buffer);
        assert_eq!(ledger.allocated(), 0);
    }

    #[test]
    fn test_retain_allocates_once() {
        let ledger = Arc::new(FrameLedger::new());
        let data = vec![7u8; 64];
        let mut buffer = BroadcastBuffer::new(&data, &ledger);

        let a = buffer.retain();
        let b = buffer.retain();
        assert_eq!(ledger.allocated(), 1);
        assert_eq!(a, b);
        assert_eq!(a.as_ptr(), b.as_ptr());

        drop(buffer);
        drop(a);
        assert_eq!(ledger.live(), 1);
        drop(b);
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.released(), 1);
    }

    #[test]
    fn test_static_payload() {
        let mut payload: &'static [u8] = b"hello";
        assert_eq!(payload.bytes(), b"hello");
        assert_eq!(payload.retain(), Bytes::from_static(b"hello"));
    }
}
