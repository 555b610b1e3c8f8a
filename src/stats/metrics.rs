//! Statistics for the registry and signaling server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Registry snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live connections
    pub connections: u64,
    /// Rooms with a broadcaster
    pub rooms: u64,
    /// Viewers joined to a live room
    pub viewers: u64,
    /// Viewers whose broadcaster left, still tagged with the room id
    pub waiting_viewers: u64,
    /// Setup messages forwarded
    pub relayed: u64,
    /// Messages not delivered: addressee gone or not reading, or relay refused
    pub dropped: u64,
}

/// Counters updated by the listener
#[derive(Debug)]
pub struct ServerCounters {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_connections: AtomicU64,
}

impl ServerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_connections: AtomicU64::new(0),
        }
    }

    /// Record an accepted connection
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished connection
    pub fn connection_closed(&self) {
        // Saturate so a stray close never wraps the gauge
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Record a connection turned away at the limit
    pub fn connection_rejected(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Connections refused because of `max_connections`
    pub rejected_connections: u64,
    /// Uptime
    pub uptime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_counters_new() {
        let stats = ServerCounters::new().snapshot();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.rejected_connections, 0);
    }

    #[test]
    fn test_open_close() {
        let counters = ServerCounters::new();
        counters.connection_opened();
        counters.connection_opened();
        counters.connection_closed();

        let stats = counters.snapshot();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_connections, 1);
    }

    #[test]
    fn test_close_saturates() {
        let counters = ServerCounters::new();
        counters.connection_closed();
        assert_eq!(counters.snapshot().active_connections, 0);
    }

    #[test]
    fn test_rejected() {
        let counters = ServerCounters::new();
        counters.connection_rejected();
        assert_eq!(counters.snapshot().rejected_connections, 1);
        assert_eq!(counters.snapshot().total_connections, 0);
    }
}
