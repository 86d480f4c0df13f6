//! Credential store

use std::io::{self, Read};

use super::ring::{FeedStatus, OneTimeTokens};

/// Which credential admitted a viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// The long-lived shared secret
    Static,
    /// A single-use token from the ring
    OneTime,
}

/// Static token plus an optional ring of one-time tokens
///
/// The ring only exists when a token feed is configured; without it, only
/// the static token is accepted.
#[derive(Debug, Clone)]
pub struct TokenStore {
    static_token: Vec<u8>,
    one_time: Option<OneTimeTokens>,
}

impl TokenStore {
    /// Create a store that accepts only `static_token`
    pub fn new(static_token: impl Into<Vec<u8>>) -> Self {
        Self {
            static_token: static_token.into(),
            one_time: None,
        }
    }

    /// Activate the one-time token ring
    pub fn with_one_time(mut self, ring: OneTimeTokens) -> Self {
        self.one_time = Some(ring);
        self
    }

    /// Whether a one-time token ring is active
    pub fn has_one_time(&self) -> bool {
        self.one_time.is_some()
    }

    /// Check a presented credential
    ///
    /// The static token is tried first. One-time tokens are only considered
    /// when the credential has exactly the token width, and a match consumes
    /// the token.
    pub fn check(&mut self, presented: &[u8]) -> Option<CredentialKind> {
        if !self.static_token.is_empty() && presented == self.static_token.as_slice() {
            return Some(CredentialKind::Static);
        }

        let ring = self.one_time.as_mut()?;
        ring.take(presented).then_some(CredentialKind::OneTime)
    }

    /// Drain the token feed into the ring; a no-op without an active ring
    pub fn ingest<R: Read>(&mut self, reader: &mut R) -> io::Result<FeedStatus> {
        match self.one_time.as_mut() {
            Some(ring) => ring.ingest(reader),
            None => Ok(FeedStatus::Drained { bytes: 0 }),
        }
    }
}
