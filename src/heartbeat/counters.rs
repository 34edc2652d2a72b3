//! Workload counters reported with every heartbeat.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters the host service updates as it works. The heartbeat loop reads a
/// [`LoadSnapshot`] on every tick.
#[derive(Debug, Default)]
pub struct LoadCounters {
    queue_size: AtomicU32,
    processed_count: AtomicU64,
    error_count: AtomicU64,
}

impl LoadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of requests currently waiting.
    pub fn set_queue_size(&self, queue_size: u32) {
        self.queue_size.store(queue_size, Ordering::Relaxed);
    }

    /// Count one completed request.
    pub fn record_processed(&self) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one failed request.
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            queue_size: self.queue_size.load(Ordering::Relaxed),
            processed_count: self.processed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LoadCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    pub queue_size: u32,
    pub processed_count: u64,
    pub error_count: u64,
}

/// Per-call values that replace the counters for one heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatOverrides {
    pub queue_size: Option<u32>,
    pub processed_count: Option<u64>,
    pub error_count: Option<u64>,
}

impl HeartbeatOverrides {
    pub fn queue_size(mut self, queue_size: u32) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    pub fn processed_count(mut self, processed_count: u64) -> Self {
        self.processed_count = Some(processed_count);
        self
    }

    pub fn error_count(mut self, error_count: u64) -> Self {
        self.error_count = Some(error_count);
        self
    }

    /// Overlay these overrides on `snapshot`.
    pub fn apply(&self, snapshot: LoadSnapshot) -> LoadSnapshot {
        LoadSnapshot {
            queue_size: self.queue_size.unwrap_or(snapshot.queue_size),
            processed_count: self.processed_count.unwrap_or(snapshot.processed_count),
            error_count: self.error_count.unwrap_or(snapshot.error_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(LoadCounters::new().snapshot(), LoadSnapshot::default());
    }

    #[test]
    fn test_counters_record() {
        let counters = LoadCounters::new();
        counters.set_queue_size(7);
        counters.record_processed();
        counters.record_processed();
        counters.record_error();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.queue_size, 7);
        assert_eq!(snapshot.processed_count, 2);
        assert_eq!(snapshot.error_count, 1);
    }

    #[test]
    fn test_overrides_win() {
        let snapshot = LoadSnapshot {
            queue_size: 3,
            processed_count: 10,
            error_count: 1,
        };
        let merged = HeartbeatOverrides::default()
            .queue_size(0)
            .error_count(5)
            .apply(snapshot);

        assert_eq!(merged.queue_size, 0);
        assert_eq!(merged.processed_count, 10);
        assert_eq!(merged.error_count, 5);
    }
}
