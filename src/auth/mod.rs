//! Viewer authentication
//!
//! A viewer is admitted with either the long-lived static token configured
//! at startup, or a one-time token pushed into the ring by an external
//! producer through the token feed. One-time tokens are cleared on first
//! use.

pub mod ring;
pub mod store;

pub use ring::{FeedStatus, OneTimeTokens};
pub use store::{CredentialKind, TokenStore};
