//! Error types
//!
//! Errors are split by blast radius: protocol errors only ever tear down the
//! connection that produced them, source errors end the whole reactor run.

use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket, poller or file I/O failure
    Io(io::Error),
    /// Malformed request from a client
    Protocol(ProtocolError),
    /// Frame source failure
    Source(SourceError),
    /// `run` called while another run is still active
    AlreadyRunning,
    /// The blocking reactor task panicked or was cancelled
    Join(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Source(e) => write!(f, "Frame source error: {}", e),
            Error::AlreadyRunning => write!(f, "Server is already running"),
            Error::Join(msg) => write!(f, "Reactor task failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Source(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<SourceError> for Error {
    fn from(e: SourceError) -> Self {
        Error::Source(e)
    }
}

/// Request line violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Receive buffer filled up before a line terminator arrived
    RequestTooLarge(usize),
    /// No space after the method
    MissingTarget,
    /// No `?` in the request target
    MissingQuery,
    /// No space terminating the request target
    UnterminatedTarget,
    /// `?` immediately followed by the terminating space
    EmptyCredential,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::RequestTooLarge(limit) => {
                write!(f, "Request line exceeds {} bytes", limit)
            }
            ProtocolError::MissingTarget => write!(f, "Request line has no target"),
            ProtocolError::MissingQuery => write!(f, "Request target has no query"),
            ProtocolError::UnterminatedTarget => write!(f, "Request target is not terminated"),
            ProtocolError::EmptyCredential => write!(f, "Credential is empty"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Frame source failures; all of them are fatal to the run
#[derive(Debug)]
pub enum SourceError {
    /// Underlying read failed with something other than would-block
    Io(io::Error),
    /// The producer closed its end of the stream
    Closed,
    /// A frame exceeded the configured maximum
    FrameTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Io(e) => write!(f, "read failed: {}", e),
            SourceError::Closed => write!(f, "stream closed by producer"),
            SourceError::FrameTooLarge { size, max } => {
                write!(f, "frame of {} bytes exceeds limit of {}", size, max)
            }
        }
    }
}

impl std::error::Error for SourceError {}

impl From<io::Error> for SourceError {
    fn from(e: io::Error) -> Self {
        SourceError::Io(e)
    }
}
