//! Reactor bookkeeping
//!
//! Capture is enabled exactly while at least one connection exists, counted
//! from accept to teardown regardless of auth state.

use crate::protocol::Timestamp;

/// Connection counts and frame timestamp state owned by the reactor
#[derive(Debug, Default)]
pub struct ReactorState {
    active: usize,
    authenticated: usize,
    last_timestamp: Timestamp,
}

impl ReactorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open connections
    pub fn active(&self) -> usize {
        self.active
    }

    /// Open authenticated connections
    pub fn authenticated(&self) -> usize {
        self.authenticated
    }

    /// Whether the frame source should currently be enabled
    pub fn capture_enabled(&self) -> bool {
        self.active > 0
    }

    /// Record an accepted connection; true on the 0 → 1 transition
    pub fn connected(&mut self) -> bool {
        self.active += 1;
        self.active == 1
    }

    /// Record a successful authentication
    pub fn authenticated_one(&mut self) {
        self.authenticated += 1;
    }

    /// Record a teardown; true on the 1 → 0 transition
    pub fn disconnected(&mut self, was_authenticated: bool) -> bool {
        if was_authenticated {
            self.authenticated = self.authenticated.saturating_sub(1);
        }
        if self.active == 0 {
            return false;
        }
        self.active -= 1;
        self.active == 0
    }

    /// Stamp a frame, never going backwards if the wall clock does
    pub fn stamp(&mut self, now: Timestamp) -> Timestamp {
        if now > self.last_timestamp {
            self.last_timestamp = now;
        }
        self.last_timestamp
    }
}
