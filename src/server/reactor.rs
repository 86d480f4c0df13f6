//! Single-threaded readiness loop
//!
//! Everything the server owns lives here and is touched only from the thread
//! running `Reactor::run`: the listener, the frame source, the token feed
//! and every connection. All descriptors are edge-triggered and drained
//! until they would block.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use mio::event::Event;
use mio::net::TcpStream;
use mio::unix::pipe;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;

use super::config::ServerConfig;
use super::connection::{Connection, Transition};
use super::listener::Listener;
use super::state::ReactorState;
use crate::auth::{FeedStatus, OneTimeTokens, TokenStore};
use crate::broadcast::{BroadcastBuffer, FrameLedger, SendOutcome};
use crate::capture::FrameSource;
use crate::error::{Error, Result};
use crate::protocol::{encode_frame, Timestamp};
use crate::stats::ServerStats;

pub(crate) const LISTENER: Token = Token(usize::MAX - 1);
pub(crate) const FRAMES: Token = Token(usize::MAX - 2);
pub(crate) const TOKEN_FEED: Token = Token(usize::MAX - 3);
pub(crate) const WAKER: Token = Token(usize::MAX - 4);

const EVENT_CAPACITY: usize = 256;

/// What a readiness token refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Listener,
    Frames,
    TokenFeed,
    Waker,
    Connection(usize),
}

impl Source {
    fn from_token(token: Token) -> Self {
        match token {
            LISTENER => Source::Listener,
            FRAMES => Source::Frames,
            TOKEN_FEED => Source::TokenFeed,
            WAKER => Source::Waker,
            Token(id) => Source::Connection(id),
        }
    }
}

pub(crate) struct Reactor<F> {
    poll: Poll,
    config: ServerConfig,
    listener: Listener,
    source: F,
    feed: Option<pipe::Receiver>,
    tokens: TokenStore,
    connections: Slab<Connection<TcpStream>>,
    state: ReactorState,
    stats: ServerStats,
    ledger: Arc<FrameLedger>,
    scratch: BytesMut,
    next_session_id: u64,
    started_at: Instant,
    last_stats: Instant,
}

impl<F: FrameSource> Reactor<F> {
    /// Register the listener and token feed; the frame source stays off
    /// until the first viewer connects
    pub(crate) fn new(
        poll: Poll,
        config: ServerConfig,
        mut listener: Listener,
        source: F,
        mut feed: Option<pipe::Receiver>,
    ) -> Result<Self> {
        poll.registry()
            .register(listener.source_mut(), LISTENER, Interest::READABLE)?;

        let mut tokens = TokenStore::new(config.static_token.clone());
        if let Some(feed) = feed.as_mut() {
            poll.registry()
                .register(feed, TOKEN_FEED, Interest::READABLE)?;
            tokens = tokens.with_one_time(OneTimeTokens::new(
                config.one_time_width,
                config.one_time_slots,
            ));
        }

        let now = Instant::now();
        Ok(Self {
            poll,
            listener,
            source,
            feed,
            tokens,
            connections: Slab::with_capacity(config.max_connections),
            state: ReactorState::new(),
            stats: ServerStats::new(),
            ledger: Arc::new(FrameLedger::new()),
            scratch: BytesMut::with_capacity(config.max_frame_size + 256),
            next_session_id: 1,
            started_at: now,
            last_stats: now,
            config,
        })
    }

    /// Loop until `stop` is raised or a fatal error occurs
    pub(crate) fn run(mut self, stop: &AtomicBool) -> Result<ServerStats> {
        let mut events = Events::with_capacity(EVENT_CAPACITY);

        'outer: while !stop.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, self.config.stats_interval) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                if stop.load(Ordering::Acquire) {
                    break 'outer;
                }

                match Source::from_token(event.token()) {
                    Source::Listener => self.accept_pending()?,
                    Source::Frames => {
                        if let Err(e) = self.broadcast_frames() {
                            tracing::error!(error = %e, "Frame source failed");
                            return Err(e);
                        }
                    }
                    Source::TokenFeed => self.refill_tokens(),
                    Source::Waker => {}
                    Source::Connection(id) => self.connection_ready(id, event)?,
                }
            }

            self.maybe_log_stats();
        }

        tracing::info!("Reactor stopping");
        Ok(self.shutdown())
    }

    fn accept_pending(&mut self) -> Result<()> {
        loop {
            let (socket, peer_addr) = match self.listener.accept() {
                Ok(Some(accepted)) => accepted,
                Ok(None) => return Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    return Ok(());
                }
            };
            self.stats.total_connections += 1;

            let limit = self.config.max_connections;
            if limit > 0 && self.connections.len() >= limit {
                self.stats.record_refused();
                tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                drop(socket);
                continue;
            }

            let session_id = self.next_session_id;
            self.next_session_id += 1;

            let entry = self.connections.vacant_entry();
            let mut connection = Connection::new(
                session_id,
                socket,
                peer_addr,
                self.config.max_request_size,
                self.config.queue_depth,
            );
            if let Err(e) = self.poll.registry().register(
                connection.socket_mut(),
                Token(entry.key()),
                Interest::READABLE | Interest::WRITABLE,
            ) {
                self.stats.record_refused();
                tracing::error!(session_id = session_id, error = %e, "Failed to register connection");
                continue;
            }
            entry.insert(connection);

            self.stats.active_connections += 1;
            tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

            if self.state.connected() {
                self.source.enable(self.poll.registry(), FRAMES)?;
            }
        }
    }

    fn broadcast_frames(&mut self) -> Result<()> {
        while self.state.capture_enabled() {
            let Some(jpeg) = self.source.try_read()? else {
                return Ok(());
            };
            self.stats.frames_captured += 1;
            let timestamp = self.state.stamp(Timestamp::now());

            if self.state.authenticated() == 0 {
                continue;
            }

            encode_frame(&mut self.scratch, &jpeg, timestamp);
            self.stats.frames_broadcast += 1;

            let mut failed = Vec::new();
            let mut buffer = BroadcastBuffer::new(&self.scratch, &self.ledger);
            for (id, connection) in self.connections.iter_mut() {
                match connection.send_frame(&mut buffer) {
                    Ok(Some(SendOutcome::Dropped)) => self.stats.dropped_messages += 1,
                    Ok(Some(_)) => self.stats.deliveries += 1,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(
                            session_id = connection.session_id(),
                            error = %e,
                            "Frame write failed"
                        );
                        failed.push(id);
                    }
                }
            }
            drop(buffer);

            for id in failed {
                self.teardown(id)?;
            }
        }
        Ok(())
    }

    fn refill_tokens(&mut self) {
        let Some(feed) = self.feed.as_mut() else {
            return;
        };

        match self.tokens.ingest(feed) {
            Ok(FeedStatus::Drained { bytes }) => {
                tracing::trace!(bytes = bytes, "Token feed drained");
            }
            Ok(FeedStatus::Closed { bytes }) => {
                tracing::warn!(bytes = bytes, "Token feed closed, one-time tokens no longer refreshed");
                self.drop_feed();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token feed failed, one-time tokens no longer refreshed");
                self.drop_feed();
            }
        }
    }

    fn drop_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            if let Err(e) = self.poll.registry().deregister(&mut feed) {
                tracing::debug!(error = %e, "Failed to deregister token feed");
            }
        }
    }

    fn connection_ready(&mut self, id: usize, event: &Event) -> Result<()> {
        let Some(connection) = self.connections.get_mut(id) else {
            return Ok(());
        };
        let session_id = connection.session_id();

        match drive(connection, event, &mut self.tokens) {
            Ok(Transition::Authenticated(_)) => {
                self.state.authenticated_one();
                self.stats.authenticated += 1;
            }
            Ok(Transition::Rejected) => self.stats.rejected += 1,
            Ok(Transition::None) => {}
            Err(Error::Protocol(e)) => {
                self.stats.protocol_errors += 1;
                tracing::debug!(session_id = session_id, error = %e, "Malformed request");
                return self.teardown(id);
            }
            Err(e) => {
                tracing::debug!(session_id = session_id, error = %e, "Connection error");
                return self.teardown(id);
            }
        }

        if self.connections[id].is_finished() {
            self.teardown(id)?;
        }
        Ok(())
    }

    /// Deregister and drop a connection; disables capture on the last one
    fn teardown(&mut self, id: usize) -> Result<()> {
        let Some(mut connection) = self.connections.try_remove(id) else {
            return Ok(());
        };
        if let Err(e) = self.poll.registry().deregister(connection.socket_mut()) {
            tracing::debug!(session_id = connection.session_id(), error = %e, "Failed to deregister");
        }

        let stats = connection.stats();
        self.stats.record_closed(&stats);
        tracing::debug!(
            session_id = connection.session_id(),
            peer = %connection.peer_addr(),
            duration_ms = stats.duration().as_millis() as u64,
            bytes_sent = stats.bytes_sent,
            bitrate = stats.bitrate(),
            dropped = stats.frames_dropped,
            drop_ratio = stats.drop_ratio(),
            "Connection closed"
        );

        if self.state.disconnected(connection.was_admitted()) {
            self.source.disable(self.poll.registry())?;
        }
        Ok(())
    }

    fn snapshot(&self) -> ServerStats {
        let mut stats = self.stats.clone();
        stats.frames_allocated = self.ledger.allocated();
        stats.frames_released = self.ledger.released();
        stats.uptime = self.started_at.elapsed();
        stats
    }

    fn maybe_log_stats(&mut self) {
        let Some(interval) = self.config.stats_interval else {
            return;
        };
        if self.last_stats.elapsed() < interval {
            return;
        }
        self.last_stats = Instant::now();

        let stats = self.snapshot();
        tracing::info!(
            active = stats.active_connections,
            total = stats.total_connections,
            frames = stats.frames_captured,
            deliveries = stats.deliveries,
            dropped = stats.dropped_messages,
            live_frames = stats.frames_live(),
            "Server stats"
        );
    }

    /// Release every connection and the feed
    fn shutdown(mut self) -> ServerStats {
        let ids: Vec<usize> = self.connections.iter().map(|(id, _)| id).collect();
        for id in ids {
            if let Err(e) = self.teardown(id) {
                tracing::debug!(error = %e, "Teardown failed during shutdown");
            }
        }
        // The last teardown above already disabled the source
        self.drop_feed();
        if let Err(e) = self.poll.registry().deregister(self.listener.source_mut()) {
            tracing::debug!(error = %e, "Failed to deregister listener");
        }

        self.snapshot()
    }
}

/// Dispatch one readiness event to a connection
fn drive(
    connection: &mut Connection<TcpStream>,
    event: &Event,
    tokens: &mut TokenStore,
) -> Result<Transition> {
    if event.is_error() {
        let err = connection
            .socket_mut()
            .take_error()?
            .unwrap_or_else(|| io::ErrorKind::ConnectionReset.into());
        return Err(err.into());
    }

    if event.is_writable() {
        connection.on_writable()?;
    }
    if event.is_readable() || event.is_read_closed() {
        return connection.on_readable(tokens);
    }
    Ok(Transition::None)
}
