//! Queue configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Maximum in-memory buffer depth, also used when the requested depth is 0.
///
/// An effectively unbounded buffer would just run the process out of memory
/// without a clean way to triage, so a sensible ceiling is enforced instead.
pub const MAX_DEPTH: usize = 1_000_000;

/// Configuration for a [`SpillQueue`](crate::SpillQueue)
#[derive(Debug, Clone)]
pub struct SpillConfig {
    /// In-memory buffer depth. `0` requests the maximum; values above
    /// [`MAX_DEPTH`] are clamped to it.
    pub max_depth: usize,

    /// Directory for the cache file pair. `None` disables spilling entirely;
    /// the queue then applies backpressure to the producer when full.
    pub cache_dir: Option<PathBuf>,

    /// Fallback tick while the drainer waits for the write file to fill.
    /// Spill writes wake the drainer immediately; this only bounds the wait
    /// if that wakeup is missed.
    pub swap_poll_interval: Duration,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            max_depth: 0,
            cache_dir: None,
            swap_poll_interval: Duration::from_secs(1),
        }
    }
}

impl SpillConfig {
    /// Create a config with default settings (maximum depth, spill disabled)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the in-memory buffer depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Enable spilling to the given cache directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the drainer's fallback poll interval
    pub fn with_swap_poll_interval(mut self, interval: Duration) -> Self {
        self.swap_poll_interval = interval;
        self
    }

    /// The buffer depth after clamping
    pub(crate) fn effective_depth(&self) -> usize {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH {
            MAX_DEPTH
        } else {
            self.max_depth
        }
    }
}
