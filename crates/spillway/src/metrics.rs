//! Spill path counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for spill activity, shared between the queue tasks
#[derive(Debug, Default)]
pub(crate) struct SpillMetrics {
    /// Items routed to disk instead of the output buffer
    items_spilled: AtomicU64,

    /// Items read back from disk into the output buffer
    items_drained: AtomicU64,

    /// Read/write file role swaps
    cache_swaps: AtomicU64,

    /// Items dropped because they failed to serialize
    encode_errors: AtomicU64,

    /// Frames abandoned because they failed to deserialize
    decode_errors: AtomicU64,

    /// Items dropped because the cache append failed
    write_errors: AtomicU64,
}

impl SpillMetrics {
    pub(crate) fn record_spilled(&self) {
        self.items_spilled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drained(&self) {
        self.items_drained.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_swap(&self) {
        self.cache_swaps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_spilled: self.items_spilled.load(Ordering::Relaxed),
            items_drained: self.items_drained.load(Ordering::Relaxed),
            cache_swaps: self.cache_swaps.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of spill activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_spilled: u64,
    pub items_drained: u64,
    pub cache_swaps: u64,
    pub encode_errors: u64,
    pub decode_errors: u64,
    pub write_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = SpillMetrics::default();
        metrics.record_spilled();
        metrics.record_spilled();
        metrics.record_drained();
        metrics.record_swap();
        metrics.record_decode_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items_spilled, 2);
        assert_eq!(snapshot.items_drained, 1);
        assert_eq!(snapshot.cache_swaps, 1);
        assert_eq!(snapshot.decode_errors, 1);
        assert_eq!(snapshot.encode_errors, 0);
        assert_eq!(snapshot.write_errors, 0);
    }
}
