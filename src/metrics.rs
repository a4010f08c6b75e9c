//! Proxy metrics collection.
//!
//! Aggregate counters only. Nothing here records destinations or peers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Connection and session counters shared by one client or server.
pub struct ProxyMetrics {
    /// Start time
    start_time: Instant,
    /// Total connections accepted
    total_connections: AtomicU64,
    /// Current active connections
    active_connections: AtomicU64,
    /// Sessions dialled straight to the destination
    direct_sessions: AtomicU64,
    /// Sessions carried through a cipher tunnel
    relayed_sessions: AtomicU64,
    /// Sessions that ended with a fatal error
    failed_sessions: AtomicU64,
}

impl ProxyMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            direct_sessions: AtomicU64::new(0),
            relayed_sessions: AtomicU64::new(0),
            failed_sessions: AtomicU64::new(0),
        }
    }

    /// Increment total and active connections.
    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections.
    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Count a direct session.
    pub fn increment_direct(&self) {
        self.direct_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a relayed session.
    pub fn increment_relayed(&self) {
        self.relayed_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed session.
    pub fn increment_failed(&self) {
        self.failed_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Total connections accepted.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Connections currently open.
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            total_connections: self.total_connections(),
            active_connections: self.active_connections(),
            direct_sessions: self.direct_sessions.load(Ordering::Relaxed),
            relayed_sessions: self.relayed_sessions.load(Ordering::Relaxed),
            failed_sessions: self.failed_sessions.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Seconds since the collector was created
    pub uptime_secs: u64,
    /// Total connections accepted
    pub total_connections: u64,
    /// Connections open when the snapshot was taken
    pub active_connections: u64,
    /// Direct sessions
    pub direct_sessions: u64,
    /// Relayed sessions
    pub relayed_sessions: u64,
    /// Failed sessions
    pub failed_sessions: u64,
}

impl MetricsSnapshot {
    /// Share of accepted connections that failed.
    pub fn failure_rate(&self) -> f64 {
        if self.total_connections == 0 {
            0.0
        } else {
            self.failed_sessions as f64 / self.total_connections as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counting() {
        let metrics = ProxyMetrics::new();

        metrics.increment_connections();
        metrics.increment_connections();
        assert_eq!(metrics.total_connections(), 2);
        assert_eq!(metrics.active_connections(), 2);

        metrics.decrement_connections();
        assert_eq!(metrics.total_connections(), 2);
        assert_eq!(metrics.active_connections(), 1);
    }

    #[test]
    fn test_snapshot() {
        let metrics = ProxyMetrics::new();

        metrics.increment_connections();
        metrics.increment_relayed();
        metrics.increment_connections();
        metrics.increment_direct();
        metrics.increment_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.relayed_sessions, 1);
        assert_eq!(snapshot.direct_sessions, 1);
        assert_eq!(snapshot.failed_sessions, 1);
        assert!((snapshot.failure_rate() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_failure_rate_empty() {
        assert_eq!(MetricsSnapshot::default().failure_rate(), 0.0);
    }
}
