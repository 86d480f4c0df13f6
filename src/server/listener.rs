//! Non-blocking TCP listener
//!
//! Accepted sockets are configured here; the connection cap and
//! registration are up to the reactor.

use std::io;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};

use crate::drain;

/// Listening socket for viewers
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    tcp_nodelay: bool,
}

impl Listener {
    /// Bind to `addr`
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let inner = TcpListener::bind(addr)?;
        let local_addr = inner.local_addr()?;
        tracing::info!(addr = %local_addr, "MJPEG server listening");
        Ok(Self {
            inner,
            local_addr,
            tcp_nodelay: true,
        })
    }

    /// Set TCP_NODELAY on accepted sockets
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// The bound address, with the real port if bound to port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn source_mut(&mut self) -> &mut TcpListener {
        &mut self.inner
    }

    /// Accept one pending connection, `None` once the backlog is empty
    pub fn accept(&mut self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let Some((socket, peer_addr)) = drain::attempt(|| self.inner.accept())? else {
            return Ok(None);
        };

        if let Err(e) = self.configure_socket(&socket) {
            // Not worth dropping the viewer over
            tracing::warn!(peer = %peer_addr, error = %e, "Failed to configure socket");
        }
        Ok(Some((socket, peer_addr)))
    }

    fn configure_socket(&self, socket: &TcpStream) -> io::Result<()> {
        if self.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}
