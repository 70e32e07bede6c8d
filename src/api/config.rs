//! Scratch allocator configuration.

use std::time::Duration;

use crate::diagnostics::StrictMode;
use crate::util::size::{kb, mb, round_to_pages};

/// How a thread arena serves its allocations. Fixed for the arena's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArenaMode {
    /// Dual-direction bump allocation from one reserved buffer.
    #[default]
    Bump,
    /// Every allocation is an individual system heap block, for use under
    /// external memory checkers.
    HeapTracked,
}

impl std::fmt::Display for ArenaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArenaMode::Bump => f.write_str("bump"),
            ArenaMode::HeapTracked => f.write_str("heap-tracked"),
        }
    }
}

/// Configuration for the scratch allocator.
#[derive(Debug, Clone)]
pub struct ScratchConfig {
    /// Bytes per thread arena (default: 10 MB). Rounded up to whole pages.
    pub arena_capacity: usize,

    /// Allocation strategy for every arena created by this allocator.
    pub mode: ArenaMode,

    /// Record per-allocation trace views.
    pub trace: bool,

    /// Idle arenas are evicted once they have seen no activity for this long.
    pub idle_timeout: Duration,

    /// A scope open this long across ticks raises a warning.
    pub leak_warning_after: Duration,

    /// A scope open this long across ticks is treated as leaked (fatal).
    pub leak_grace: Duration,

    /// Diagnostic escalation.
    pub strict: StrictMode,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            arena_capacity: mb(10),
            mode: ArenaMode::Bump,
            trace: false,
            idle_timeout: Duration::from_secs(5),
            leak_warning_after: Duration::from_secs(1),
            leak_grace: Duration::from_secs(5),
            strict: StrictMode::Warn,
        }
    }
}

impl ScratchConfig {
    /// Heap-tracked arenas with tracing, for running under memory checkers.
    pub fn debug() -> Self {
        Self {
            mode: ArenaMode::HeapTracked,
            trace: true,
            ..Self::default()
        }
    }

    /// Small arenas for tests or constrained environments.
    pub fn minimal() -> Self {
        Self {
            arena_capacity: kb(64),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `FRAMESCRATCH_*` environment variables.
    ///
    /// Recognized: `FRAMESCRATCH_CAPACITY_KB`, `FRAMESCRATCH_HEAP_MODE`,
    /// `FRAMESCRATCH_TRACE`, `FRAMESCRATCH_IDLE_SECS`, `FRAMESCRATCH_STRICT`.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("FRAMESCRATCH_CAPACITY_KB") {
            match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.arena_capacity = kb(n),
                _ => log::warn!("ignoring FRAMESCRATCH_CAPACITY_KB={value:?}: expected a positive integer"),
            }
        }
        if let Some(value) = lookup("FRAMESCRATCH_HEAP_MODE") {
            match parse_flag(&value) {
                Some(true) => config.mode = ArenaMode::HeapTracked,
                Some(false) => config.mode = ArenaMode::Bump,
                None => log::warn!("ignoring FRAMESCRATCH_HEAP_MODE={value:?}: expected a boolean"),
            }
        }
        if let Some(value) = lookup("FRAMESCRATCH_TRACE") {
            match parse_flag(&value) {
                Some(flag) => config.trace = flag,
                None => log::warn!("ignoring FRAMESCRATCH_TRACE={value:?}: expected a boolean"),
            }
        }
        if let Some(value) = lookup("FRAMESCRATCH_IDLE_SECS") {
            match value.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs >= 0.0 => {
                    config.idle_timeout = Duration::from_secs_f64(secs)
                }
                _ => log::warn!("ignoring FRAMESCRATCH_IDLE_SECS={value:?}: expected seconds"),
            }
        }
        if let Some(value) = lookup("FRAMESCRATCH_STRICT") {
            config.strict = StrictMode::parse(&value);
        }

        config
    }

    /// Builder pattern: set per-thread arena capacity.
    pub fn with_arena_capacity(mut self, bytes: usize) -> Self {
        self.arena_capacity = bytes;
        self
    }

    /// Builder pattern: set the allocation strategy.
    pub fn with_mode(mut self, mode: ArenaMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder pattern: enable or disable trace views.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Builder pattern: set the idle eviction timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Builder pattern: set the leak warning and fatal thresholds.
    pub fn with_leak_thresholds(mut self, warning_after: Duration, grace: Duration) -> Self {
        self.leak_warning_after = warning_after;
        self.leak_grace = grace;
        self
    }

    /// Builder pattern: set strict mode.
    pub fn with_strict(mut self, strict: StrictMode) -> Self {
        self.strict = strict;
        self
    }

    /// Capacity actually reserved per arena.
    pub fn effective_capacity(&self) -> usize {
        round_to_pages(self.arena_capacity)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ScratchConfig::default();
        assert_eq!(config.arena_capacity, mb(10));
        assert_eq!(config.mode, ArenaMode::Bump);
        assert!(!config.trace);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_effective_capacity_is_page_rounded() {
        let config = ScratchConfig::default().with_arena_capacity(1);
        let page = crate::util::size::page_size();
        assert_eq!(config.effective_capacity(), page);
    }

    #[test]
    fn test_env_overlay() {
        let config = ScratchConfig::from_lookup(lookup(&[
            ("FRAMESCRATCH_CAPACITY_KB", "256"),
            ("FRAMESCRATCH_HEAP_MODE", "1"),
            ("FRAMESCRATCH_TRACE", "true"),
            ("FRAMESCRATCH_IDLE_SECS", "0.5"),
            ("FRAMESCRATCH_STRICT", "warning"),
        ]));
        assert_eq!(config.arena_capacity, kb(256));
        assert_eq!(config.mode, ArenaMode::HeapTracked);
        assert!(config.trace);
        assert_eq!(config.idle_timeout, Duration::from_millis(500));
        assert_eq!(config.strict, StrictMode::PanicOnWarning);
    }

    #[test]
    fn test_env_garbage_is_ignored() {
        let config = ScratchConfig::from_lookup(lookup(&[
            ("FRAMESCRATCH_CAPACITY_KB", "lots"),
            ("FRAMESCRATCH_HEAP_MODE", "maybe"),
        ]));
        assert_eq!(config.arena_capacity, mb(10));
        assert_eq!(config.mode, ArenaMode::Bump);
    }

    #[test]
    fn test_presets() {
        assert_eq!(ScratchConfig::debug().mode, ArenaMode::HeapTracked);
        assert!(ScratchConfig::debug().trace);
        assert_eq!(ScratchConfig::minimal().arena_capacity, kb(64));
    }
}
