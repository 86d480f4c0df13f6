//! Per-viewer connection state machine
//!
//! ```text
//!              credential ok
//!  Connecting ───────────────► Authenticated ──► (frames until error/EOF)
//!      │
//!      │ credential rejected
//!      ▼
//!   Rejected ── 401 flushed ──► Closed
//! ```
//!
//! Malformed requests and I/O errors skip straight to teardown.

use std::io::{Read, Write};
use std::net::SocketAddr;

use bytes::BytesMut;

use crate::auth::{CredentialKind, TokenStore};
use crate::broadcast::{BroadcastBuffer, FlushStatus, OutboundQueue, SendOutcome};
use crate::drain;
use crate::error::{ProtocolError, Result};
use crate::protocol::{parse_request_line, RequestLine, UNAUTHORIZED, WELCOME};
use crate::stats::ConnectionStats;

/// Scratch size for discarding input after the request line
const DISCARD_CHUNK: usize = 1024;

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Waiting for the request line
    Connecting,
    /// Receiving frames
    Authenticated,
    /// 401 queued; closes once it is flushed
    Rejected,
    /// Peer went away; ready for teardown
    Closed,
}

/// Auth-relevant result of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed
    None,
    /// Credential accepted
    Authenticated(CredentialKind),
    /// Credential rejected
    Rejected,
}

/// A viewer connection over any non-blocking socket
pub struct Connection<S> {
    session_id: u64,
    peer_addr: SocketAddr,
    socket: S,
    phase: ConnectionPhase,
    admitted: bool,
    request: BytesMut,
    max_request_size: usize,
    outbound: OutboundQueue,
    stats: ConnectionStats,
}

impl<S: Read + Write> Connection<S> {
    /// Wrap an accepted socket
    pub fn new(
        session_id: u64,
        socket: S,
        peer_addr: SocketAddr,
        max_request_size: usize,
        queue_depth: usize,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            socket,
            phase: ConnectionPhase::Connecting,
            admitted: false,
            request: BytesMut::with_capacity(max_request_size),
            max_request_size,
            outbound: OutboundQueue::new(queue_depth),
            stats: ConnectionStats::new(),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == ConnectionPhase::Authenticated
    }

    /// Whether the credential was ever accepted, even if since closed
    pub fn was_admitted(&self) -> bool {
        self.admitted
    }

    /// Ready for teardown: closed, or rejected with the 401 fully sent
    pub fn is_finished(&self) -> bool {
        match self.phase {
            ConnectionPhase::Closed => true,
            ConnectionPhase::Rejected => self.outbound.is_idle(),
            _ => false,
        }
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    /// Snapshot of this connection's statistics
    pub fn stats(&self) -> ConnectionStats {
        let mut stats = self.stats.clone();
        stats.bytes_sent = self.outbound.bytes_sent();
        stats.frames_dropped = self.outbound.dropped();
        stats
    }

    /// Handle read readiness
    ///
    /// Drains the socket until it would block. Protocol violations and I/O
    /// errors are returned; the caller tears the connection down.
    pub fn on_readable(&mut self, tokens: &mut TokenStore) -> Result<Transition> {
        match self.phase {
            ConnectionPhase::Connecting => {
                let transition = self.read_request(tokens)?;
                if self.phase != ConnectionPhase::Connecting {
                    self.discard_input()?;
                }
                Ok(transition)
            }
            ConnectionPhase::Authenticated | ConnectionPhase::Rejected => {
                self.discard_input()?;
                Ok(Transition::None)
            }
            ConnectionPhase::Closed => Ok(Transition::None),
        }
    }

    /// Handle write readiness
    pub fn on_writable(&mut self) -> Result<FlushStatus> {
        Ok(self.outbound.flush(&mut self.socket)?)
    }

    /// Offer a broadcast frame; ignored unless authenticated
    pub fn send_frame(&mut self, frame: &mut BroadcastBuffer<'_>) -> Result<Option<SendOutcome>> {
        if self.phase != ConnectionPhase::Authenticated {
            return Ok(None);
        }

        let outcome = self.outbound.send(&mut self.socket, frame)?;
        if outcome == SendOutcome::Dropped {
            tracing::debug!(
                session_id = self.session_id,
                queued = self.outbound.len(),
                "Viewer queue full, frame dropped"
            );
        } else {
            self.stats.frames_delivered += 1;
        }
        Ok(Some(outcome))
    }

    fn read_request(&mut self, tokens: &mut TokenStore) -> Result<Transition> {
        loop {
            let start = self.request.len();
            if start >= self.max_request_size {
                return Err(ProtocolError::RequestTooLarge(self.max_request_size).into());
            }

            self.request.resize(self.max_request_size, 0);
            let socket = &mut self.socket;
            let spare = &mut self.request[start..];
            let read = match drain::attempt(|| socket.read(&mut spare[..])) {
                Ok(read) => read,
                Err(e) => {
                    self.request.truncate(start);
                    return Err(e.into());
                }
            };
            self.request.truncate(start + read.unwrap_or(0));

            match read {
                Some(0) => {
                    self.phase = ConnectionPhase::Closed;
                    return Ok(Transition::None);
                }
                Some(n) => self.stats.bytes_received += n as u64,
                None => return Ok(Transition::None),
            }

            if let Some(line) = parse_request_line(&self.request)? {
                return self.authenticate(&line, tokens);
            }
        }
    }

    fn authenticate(&mut self, line: &RequestLine, tokens: &mut TokenStore) -> Result<Transition> {
        let credential = line.credential(&self.request);
        let transition = match tokens.check(credential) {
            Some(kind) => {
                tracing::info!(
                    session_id = self.session_id,
                    peer = %self.peer_addr,
                    credential = ?kind,
                    "Viewer authenticated"
                );
                // Only count the viewer once the preamble is accepted
                let mut welcome = WELCOME;
                self.outbound.send(&mut self.socket, &mut welcome)?;
                self.phase = ConnectionPhase::Authenticated;
                self.admitted = true;
                Transition::Authenticated(kind)
            }
            None => {
                tracing::info!(
                    session_id = self.session_id,
                    peer = %self.peer_addr,
                    "Viewer rejected"
                );
                self.phase = ConnectionPhase::Rejected;
                let mut unauthorized = UNAUTHORIZED;
                self.outbound.send(&mut self.socket, &mut unauthorized)?;
                Transition::Rejected
            }
        };

        // The request line is never looked at again
        self.request = BytesMut::new();
        Ok(transition)
    }

    fn discard_input(&mut self) -> Result<()> {
        let mut scratch = [0u8; DISCARD_CHUNK];
        loop {
            match drain::attempt(|| self.socket.read(&mut scratch))? {
                Some(0) => {
                    // A rejected peer may half-close while the 401 is still pending
                    if self.phase == ConnectionPhase::Authenticated {
                        self.phase = ConnectionPhase::Closed;
                    }
                    return Ok(());
                }
                Some(_) => continue,
                None => return Ok(()),
            }
        }
    }
}

impl<S> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session_id", &self.session_id)
            .field("peer_addr", &self.peer_addr)
            .field("phase", &self.phase)
            .field("queued", &self.outbound.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::OneTimeTokens;
    use crate::broadcast::FrameLedger;
    use crate::drain::testing::MockSocket;
    use crate::error::Error;
    use crate::server::state::ReactorState;

    fn connection(socket: MockSocket) -> Connection<MockSocket> {
        let peer: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        Connection::new(1, socket, peer, 64, 5)
    }

    fn tokens() -> TokenStore {
        TokenStore::new("abc")
    }

    #[test]
    fn test_valid_credential_sends_preamble() {
        let mut socket = MockSocket::fast();
        socket.feed(b"GET /stream?abc HTTP/1.1\r\nHost: cam\r\n\r\n");
        let mut conn = connection(socket);

        let transition = conn.on_readable(&mut tokens()).unwrap();

        assert_eq!(transition, Transition::Authenticated(CredentialKind::Static));
        assert_eq!(conn.phase(), ConnectionPhase::Authenticated);
        assert!(!conn.is_finished());
        assert_eq!(conn.socket_mut().written, WELCOME);
        // Headers after the request line were drained
        assert!(conn.socket_mut().input.is_empty());
    }

    #[test]
    fn test_request_line_split_across_reads() {
        let mut conn = connection(MockSocket::fast());
        let mut store = tokens();

        conn.socket_mut().feed(b"GET /?a");
        assert_eq!(conn.on_readable(&mut store).unwrap(), Transition::None);
        assert_eq!(conn.phase(), ConnectionPhase::Connecting);

        conn.socket_mut().feed(b"bc HTTP/1.1\r\n");
        assert_eq!(
            conn.on_readable(&mut store).unwrap(),
            Transition::Authenticated(CredentialKind::Static)
        );
    }

    #[test]
    fn test_wrong_credential_sends_401() {
        let mut socket = MockSocket::fast();
        socket.feed(b"GET /?nope HTTP/1.1\r\n");
        let mut conn = connection(socket);

        assert_eq!(conn.on_readable(&mut tokens()).unwrap(), Transition::Rejected);
        assert_eq!(conn.phase(), ConnectionPhase::Rejected);
        assert_eq!(conn.socket_mut().written, UNAUTHORIZED);
        assert!(conn.is_finished());
    }

    #[test]
    fn test_rejected_waits_for_flush() {
        let mut socket = MockSocket::stalled();
        socket.feed(b"GET /?nope HTTP/1.1\r\n");
        let mut conn = connection(socket);

        conn.on_readable(&mut tokens()).unwrap();
        assert!(!conn.is_finished());

        conn.socket_mut().write_budget = usize::MAX;
        assert_eq!(conn.on_writable().unwrap(), FlushStatus::Idle);
        assert!(conn.is_finished());
        assert_eq!(conn.socket_mut().written, UNAUTHORIZED);
    }

    #[test]
    fn test_missing_query_is_protocol_error() {
        let mut socket = MockSocket::fast();
        socket.feed(b"GET /stream HTTP/1.1\r\n");
        let mut conn = connection(socket);

        let err = conn.on_readable(&mut tokens()).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::MissingQuery)));
        assert!(conn.socket_mut().written.is_empty());
    }

    #[test]
    fn test_request_too_large() {
        let mut socket = MockSocket::fast();
        socket.feed(&[b'A'; 100]);
        let mut conn = connection(socket);

        let err = conn.on_readable(&mut tokens()).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::RequestTooLarge(64))));
    }

    #[test]
    fn test_peer_close_before_request() {
        let socket = MockSocket {
            eof: true,
            ..MockSocket::fast()
        };
        let mut conn = connection(socket);

        assert_eq!(conn.on_readable(&mut tokens()).unwrap(), Transition::None);
        assert!(conn.is_finished());
    }

    #[test]
    fn test_peer_close_after_auth() {
        let mut socket = MockSocket::fast();
        socket.feed(b"GET /?abc HTTP/1.1\r\n");
        let mut conn = connection(socket);
        conn.on_readable(&mut tokens()).unwrap();
        assert!(!conn.is_finished());

        conn.socket_mut().eof = true;
        conn.on_readable(&mut tokens()).unwrap();
        assert_eq!(conn.phase(), ConnectionPhase::Closed);
        assert!(conn.is_finished());
        assert!(conn.was_admitted());
    }

    #[test]
    fn test_one_time_credential() {
        let mut ring = OneTimeTokens::new(20, 2);
        ring.write(b"0123456789abcdefghij\n");
        let mut store = TokenStore::new("abc").with_one_time(ring);

        let mut first = connection(MockSocket::fast());
        first.socket_mut().feed(b"GET /?0123456789abcdefghij HTTP/1.1\r\n");
        assert_eq!(
            first.on_readable(&mut store).unwrap(),
            Transition::Authenticated(CredentialKind::OneTime)
        );

        let mut second = connection(MockSocket::fast());
        second.socket_mut().feed(b"GET /?0123456789abcdefghij HTTP/1.1\r\n");
        assert_eq!(second.on_readable(&mut store).unwrap(), Transition::Rejected);
    }

    #[test]
    fn test_frames_only_after_auth() {
        let ledger = Arc::new(FrameLedger::new());
        let frame = b"frame".to_vec();
        let mut conn = connection(MockSocket::fast());

        let mut buffer = BroadcastBuffer::new(&frame, &ledger);
        assert_eq!(conn.send_frame(&mut buffer).unwrap(), None);

        conn.socket_mut().feed(b"GET /?abc HTTP/1.1\r\n");
        conn.on_readable(&mut tokens()).unwrap();
        assert_eq!(
            conn.send_frame(&mut buffer).unwrap(),
            Some(SendOutcome::Written)
        );
        assert!(conn.socket_mut().written.ends_with(b"frame"));
        assert_eq!(conn.stats().frames_delivered, 1);
    }

    #[test]
    fn test_slow_viewer_drops_frames() {
        let ledger = Arc::new(FrameLedger::new());
        let frame = vec![1u8; 16];
        let mut socket = MockSocket::stalled();
        socket.feed(b"GET /?abc HTTP/1.1\r\n");
        let mut conn = connection(socket);
        conn.on_readable(&mut tokens()).unwrap();

        // Preamble is active; five frames fill the queue, the sixth is dropped
        for _ in 0..6 {
            let mut buffer = BroadcastBuffer::new(&frame, &ledger);
            conn.send_frame(&mut buffer).unwrap();
        }

        let stats = conn.stats();
        assert_eq!(stats.frames_delivered, 5);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(conn.outbound().len(), 5);
    }

    #[test]
    fn test_failed_preamble_does_not_count_as_admitted() {
        let mut state = ReactorState::new();
        state.connected();
        state.authenticated_one();

        let mut socket = MockSocket::fast();
        socket.feed(b"GET /?abc HTTP/1.1\r\n");
        socket.fail_write = Some(std::io::ErrorKind::ConnectionReset);
        let mut late = connection(socket);
        state.connected();

        assert!(matches!(late.on_readable(&mut tokens()), Err(Error::Io(_))));
        assert!(!late.was_admitted());
        assert_eq!(late.phase(), ConnectionPhase::Connecting);

        // Tearing the failed viewer down leaves the streaming one counted
        state.disconnected(late.was_admitted());
        assert_eq!(state.active(), 1);
        assert_eq!(state.authenticated(), 1);
    }
}
