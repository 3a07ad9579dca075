use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for observability.
///
/// Use `snapshot()` for a point-in-time view of all counters, or the
/// individual getters for specific values.
///
/// # Example
/// ```ignore
/// let metrics = connection.metrics();
/// println!("reconnections: {}", metrics.reconnections());
/// ```
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnections_total: AtomicU64,
    messages_sent_total: AtomicU64,
    messages_received_total: AtomicU64,
    errors_total: AtomicU64,
    retries_exhausted_total: AtomicU64,
}

/// Point-in-time view of all counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Transports that reached the open state
    pub connections: u64,
    /// Reconnect cycles started (scheduled or forced)
    pub reconnections: u64,
    /// Payloads handed to a transport
    pub messages_sent: u64,
    /// Messages relayed from a transport
    pub messages_received: u64,
    /// Transport-level errors relayed
    pub errors: u64,
    /// Times the retry budget was spent
    pub retries_exhausted: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total transports that reached the open state.
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Total reconnect cycles started.
    pub fn reconnections(&self) -> u64 {
        self.reconnections_total.load(Ordering::Relaxed)
    }

    /// Total payloads handed to a transport.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent_total.load(Ordering::Relaxed)
    }

    /// Total messages relayed from a transport.
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Total transport-level errors relayed.
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Times the retry budget was spent.
    pub fn retries_exhausted(&self) -> u64 {
        self.retries_exhausted_total.load(Ordering::Relaxed)
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections: self.connections(),
            reconnections: self.reconnections(),
            messages_sent: self.messages_sent(),
            messages_received: self.messages_received(),
            errors: self.errors(),
            retries_exhausted: self.retries_exhausted(),
        }
    }

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnection(&self) {
        self.reconnections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_sent(&self) {
        self.messages_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retries_exhausted(&self) {
        self.retries_exhausted_total.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let metrics = Metrics::new();
        metrics.record_connection();
        metrics.record_connection();
        metrics.record_reconnection();
        metrics.record_message_sent();
        metrics.record_message_received();
        metrics.record_error();
        metrics.record_retries_exhausted();

        assert_eq!(metrics.connections(), 2);
        assert_eq!(metrics.reconnections(), 1);
        assert_eq!(metrics.messages_sent(), 1);
        assert_eq!(metrics.messages_received(), 1);
        assert_eq!(metrics.errors(), 1);
        assert_eq!(metrics.retries_exhausted(), 1);
    }

    #[test]
    fn test_snapshot_matches_getters() {
        let metrics = Metrics::new();
        metrics.record_connection();
        metrics.record_message_sent();

        let snapshot = metrics.snapshot();
        assert_eq!(
            snapshot,
            MetricsSnapshot {
                connections: 1,
                messages_sent: 1,
                ..MetricsSnapshot::default()
            }
        );
    }
}
