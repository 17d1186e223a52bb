//! Relay counters for monitoring and log summaries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic counters, updated lock-free from every connection task.
pub struct RelayMetrics {
    pub connections_accepted: AtomicU64,
    pub connections_resumed: AtomicU64,
    pub resumption_mismatches: AtomicU64,
    pub envelopes_dispatched: AtomicU64,
    pub relays_forwarded: AtomicU64,
    pub relays_dropped: AtomicU64,
    pub broadcasts: AtomicU64,
    pub broadcast_deliveries: AtomicU64,
    pub unknown_requests: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub evictions: AtomicU64,
    started_at: Instant,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            connections_accepted: AtomicU64::new(0),
            connections_resumed: AtomicU64::new(0),
            resumption_mismatches: AtomicU64::new(0),
            envelopes_dispatched: AtomicU64::new(0),
            relays_forwarded: AtomicU64::new(0),
            relays_dropped: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            broadcast_deliveries: AtomicU64::new(0),
            unknown_requests: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Deliveries per broadcast, for a quick fan-out health read.
    pub fn fanout_ratio(&self) -> f64 {
        let broadcasts = self.broadcasts.load(Ordering::Relaxed);
        if broadcasts == 0 {
            0.0
        } else {
            self.broadcast_deliveries.load(Ordering::Relaxed) as f64 / broadcasts as f64
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelayMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RelayMetrics {{ accepted: {}, resumed: {}, dispatched: {}, relayed: {}/{} dropped, broadcasts: {} (x{:.1}), unknown: {}, evicted: {}, uptime: {}s }}",
            self.connections_accepted.load(Ordering::Relaxed),
            self.connections_resumed.load(Ordering::Relaxed),
            self.envelopes_dispatched.load(Ordering::Relaxed),
            self.relays_forwarded.load(Ordering::Relaxed),
            self.relays_dropped.load(Ordering::Relaxed),
            self.broadcasts.load(Ordering::Relaxed),
            self.fanout_ratio(),
            self.unknown_requests.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_ratio_handles_zero_broadcasts() {
        let metrics = RelayMetrics::new();
        assert_eq!(metrics.fanout_ratio(), 0.0);

        metrics.broadcasts.store(2, Ordering::Relaxed);
        metrics.broadcast_deliveries.store(5, Ordering::Relaxed);
        assert_eq!(metrics.fanout_ratio(), 2.5);
    }

    #[test]
    fn display_summarizes_counters() {
        let metrics = RelayMetrics::new();
        metrics.connections_accepted.store(3, Ordering::Relaxed);
        let text = metrics.to_string();
        assert!(text.contains("accepted: 3"));
    }
}
