//! Scratch allocator statistics.

use std::thread::ThreadId;
use std::time::Duration;

use crate::api::config::ArenaMode;
use crate::util::size::format_bytes;

/// Snapshot of one thread arena.
#[derive(Debug, Clone)]
pub struct ArenaStats {
    /// Thread that owns the arena.
    pub thread_id: ThreadId,

    /// Name of the owning thread, if it has one.
    pub thread_name: Option<String>,

    /// Strategy the arena was created with.
    pub mode: ArenaMode,

    /// Capacity budget in bytes.
    pub capacity: usize,

    /// Number of currently open scopes.
    pub open_depth: u32,

    /// Bytes currently claimed.
    pub usage: usize,

    /// Lifetime high-water mark.
    pub peak_usage: usize,

    /// High-water mark since the last idle tick.
    pub frame_peak_usage: usize,

    /// Time since the arena last saw a push or allocation.
    pub idle_time: Duration,

    /// Live heap blocks (heap-tracked mode only).
    pub tracked_items: usize,
}

impl ArenaStats {
    /// Fraction of the capacity currently claimed.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.usage as f64 / self.capacity as f64
    }
}

/// Aggregated statistics over all registered arenas.
#[derive(Debug, Clone, Default)]
pub struct ScratchStats {
    /// One entry per registered arena.
    pub arenas: Vec<ArenaStats>,

    /// Ticks processed so far.
    pub frame_number: u64,

    /// Arenas created over the allocator's lifetime.
    pub arenas_created: u64,

    /// Arenas evicted for idleness.
    pub arenas_evicted: u64,

    /// Highest single-arena usage observed.
    pub peak_usage: usize,
}

impl ScratchStats {
    /// Sum of current usage over all arenas.
    pub fn total_usage(&self) -> usize {
        self.arenas.iter().map(|a| a.usage).sum()
    }

    /// Sum of open scopes over all arenas.
    pub fn open_scopes(&self) -> u32 {
        self.arenas.iter().map(|a| a.open_depth).sum()
    }
}

impl std::fmt::Display for ScratchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Scratch Statistics (frame {}):", self.frame_number)?;
        writeln!(f, "  Live arenas:  {}", self.arenas.len())?;
        writeln!(f, "  Created:      {}", self.arenas_created)?;
        writeln!(f, "  Evicted:      {}", self.arenas_evicted)?;
        writeln!(f, "  In use:       {}", format_bytes(self.total_usage()))?;
        writeln!(f, "  Peak:         {}", format_bytes(self.peak_usage))?;
        for arena in &self.arenas {
            let name = arena.thread_name.as_deref().unwrap_or("<unnamed>");
            writeln!(
                f,
                "  - {} ({:?}) {}: {} / {} depth={} peak={}",
                name,
                arena.thread_id,
                arena.mode,
                format_bytes(arena.usage),
                format_bytes(arena.capacity),
                arena.open_depth,
                format_bytes(arena.peak_usage)
            )?;
        }
        Ok(())
    }
}

/// Outcome of one [`ScratchAlloc::tick`](crate::ScratchAlloc::tick).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frame number after this tick.
    pub frame_number: u64,

    /// Idle arenas rewound to empty.
    pub reset: usize,

    /// Arenas released for exceeding the idle timeout.
    pub evicted: usize,

    /// Arenas that still had open scopes.
    pub open: usize,

    /// Open-scope warnings raised.
    pub warnings: usize,
}
