//! Statistics for viewer connections and the reactor

use std::time::{Duration, Instant};

/// Connection-level statistics
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    /// When the connection was accepted
    pub connected_at: Instant,
    /// Request bytes received before authentication
    pub bytes_received: u64,
    /// Total bytes written to the socket
    pub bytes_sent: u64,
    /// Frames handed to the outbound queue (written, pending or queued)
    pub frames_delivered: u64,
    /// Frames dropped because the queue was full
    pub frames_dropped: u64,
}

impl ConnectionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            connected_at: Instant::now(),
            bytes_received: 0,
            bytes_sent: 0,
            frames_delivered: 0,
            frames_dropped: 0,
        }
    }

    /// Time since the connection was accepted
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Average outbound bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }

    /// Fraction of offered frames that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let offered = self.frames_delivered + self.frames_dropped;
        if offered == 0 {
            0.0
        } else {
            self.frames_dropped as f64 / offered as f64
        }
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Connections currently open
    pub active_connections: u64,
    /// Connections closed after being served
    pub closed_connections: u64,
    /// Connections dropped right after accept: cap reached or registration failed
    pub refused_connections: u64,
    /// Viewers admitted
    pub authenticated: u64,
    /// Viewers sent a 401
    pub rejected: u64,
    /// Connections torn down for a malformed request
    pub protocol_errors: u64,
    /// Frames read from the source
    pub frames_captured: u64,
    /// Frames offered to at least one viewer
    pub frames_broadcast: u64,
    /// Frame deliveries across all viewers
    pub deliveries: u64,
    /// Frame deliveries dropped for backpressure
    pub dropped_messages: u64,
    /// Bytes written to viewers that have since disconnected
    pub bytes_sent: u64,
    /// Shared frame allocations
    pub frames_allocated: u64,
    /// Shared frame allocations released
    pub frames_released: u64,
    /// Time since the reactor started
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a closed connection into the totals
    pub fn record_closed(&mut self, conn: &ConnectionStats) {
        self.active_connections = self.active_connections.saturating_sub(1);
        self.closed_connections += 1;
        self.bytes_sent += conn.bytes_sent;
    }

    /// Count a connection that was accepted but never served
    pub fn record_refused(&mut self) {
        self.refused_connections += 1;
    }

    /// Every accepted connection is open, closed, or refused
    pub fn connections_accounted(&self) -> bool {
        self.total_connections
            == self.active_connections + self.closed_connections + self.refused_connections
    }

    /// Shared allocations not yet released
    pub fn frames_live(&self) -> u64 {
        self.frames_allocated.saturating_sub(self.frames_released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_stats_new() {
        let stats = ConnectionStats::new();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.frames_delivered, 0);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_connection_drop_ratio() {
        let mut stats = ConnectionStats::new();
        assert_eq!(stats.drop_ratio(), 0.0);

        stats.frames_delivered = 3;
        stats.frames_dropped = 1;
        assert_eq!(stats.drop_ratio(), 0.25);
    }

    #[test]
    fn test_server_stats_new() {
        let stats = ServerStats::new();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.frames_live(), 0);
    }

    #[test]
    fn test_record_closed() {
        let mut server = ServerStats::new();
        server.total_connections = 2;
        server.active_connections = 2;

        let mut conn = ConnectionStats::new();
        conn.bytes_sent = 1500;
        server.record_closed(&conn);

        assert_eq!(server.active_connections, 1);
        assert_eq!(server.closed_connections, 1);
        assert_eq!(server.bytes_sent, 1500);
        assert_eq!(server.total_connections, 2);
        assert!(server.connections_accounted());
    }

    #[test]
    fn test_refused_connections_are_accounted() {
        let mut server = ServerStats::new();
        server.total_connections = 3;
        server.active_connections = 1;
        assert!(!server.connections_accounted());

        server.record_refused();
        server.record_refused();
        assert_eq!(server.refused_connections, 2);
        assert_eq!(server.active_connections, 1);
        assert!(server.connections_accounted());
    }

    #[test]
    fn test_frames_live() {
        let stats = ServerStats {
            frames_allocated: 10,
            frames_released: 7,
            ..Default::default()
        };
        assert_eq!(stats.frames_live(), 3);
    }
}
