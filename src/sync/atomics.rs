//! Atomic helpers for registry-wide counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A monotonically increasing counter.
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create a new counter.
    pub const fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    /// Increment the counter, returning the new value.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// A high-water mark.
pub struct AtomicPeak(AtomicUsize);

impl AtomicPeak {
    /// Create a new peak tracker.
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Get the current value.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    /// Raise the mark to `value` if it is higher.
    pub fn update_max(&self, value: usize) {
        self.0.fetch_max(value, Ordering::Relaxed);
    }
}

impl Default for AtomicPeak {
    fn default() -> Self {
        Self::new()
    }
}
