//! The main allocator type.

use std::panic::Location;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use crate::api::config::ScratchConfig;
use crate::api::scope::ScratchScope;
use crate::api::stats::{ArenaStats, ScratchStats, TickReport};
use crate::core::registry::Registry;
use crate::core::tls;
use crate::diagnostics::context::{CallSite, DiagContext};
use crate::diagnostics::emit::{DiagnosticSink, StderrSink};
use crate::diagnostics::kind::FS001;
use crate::diagnostics::trace::TraceView;
use crate::error::ScratchError;

/// The scratch allocator.
///
/// Owns the registry of per-thread arenas. Any thread may push scopes; its
/// arena is created on first use. The frame driver calls [`tick`](Self::tick)
/// once per frame. Cheap to clone (internally uses `Arc`) and thread-safe.
///
/// # Example
///
/// ```rust,no_run
/// use framescratch::{ScratchAlloc, ScratchConfig};
/// use std::time::Duration;
///
/// let alloc = ScratchAlloc::new(ScratchConfig::default());
///
/// alloc.with_scratch(|scope| {
///     let verts = scope.alloc_slice_fill(1024, [0.0f32; 3]);
///     verts[0] = [1.0, 2.0, 3.0];
/// });
///
/// alloc.tick(Duration::from_millis(16));
/// ```
#[derive(Clone)]
pub struct ScratchAlloc {
    inner: Arc<Registry>,
}

impl ScratchAlloc {
    /// Create a new allocator reporting diagnostics to stderr.
    pub fn new(config: ScratchConfig) -> Self {
        Self::with_sink(config, Arc::new(StderrSink))
    }

    /// Create an allocator with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ScratchConfig::default())
    }

    /// Create an allocator reporting diagnostics to `sink`.
    pub fn with_sink(config: ScratchConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            inner: Arc::new(Registry::new(config, sink)),
        }
    }

    /// Open a scope on the calling thread's arena, recording the caller as
    /// its site. Failing to create the arena is fatal.
    #[track_caller]
    pub fn push(&self) -> ScratchScope {
        self.push_at(Some(Location::caller()))
    }

    /// Open a scope with an explicit (or no) call site.
    pub fn push_at(&self, site: Option<CallSite>) -> ScratchScope {
        self.try_push_at(site).unwrap_or_else(|err| {
            let context = DiagContext::capture(self.frame_number()).with_scope(site, 0);
            self.inner.emitter().fatal(&FS001, &context, &err)
        })
    }

    /// Open a scope, returning arena creation failures.
    #[track_caller]
    pub fn try_push(&self) -> Result<ScratchScope, ScratchError> {
        self.try_push_at(Some(Location::caller()))
    }

    /// Open a scope with an explicit (or no) call site, returning arena
    /// creation failures.
    pub fn try_push_at(&self, site: Option<CallSite>) -> Result<ScratchScope, ScratchError> {
        loop {
            let arena = tls::current_arena(&self.inner)?;
            let mut guard = arena.lock();
            // Evicted or released between the lookup and the lock: look again.
            if guard.is_released() {
                continue;
            }
            let id = guard.push(site)?;
            drop(guard);
            return Ok(ScratchScope::new(arena, Arc::clone(&self.inner), id, site));
        }
    }

    /// Run `f` inside a fresh scope, popping it afterwards.
    #[track_caller]
    pub fn with_scratch<R>(&self, f: impl FnOnce(&ScratchScope) -> R) -> R {
        let scope = self.push();
        let result = f(&scope);
        scope.pop();
        result
    }

    /// Advance every arena by one frame.
    ///
    /// Idle arenas are rewound to empty, arenas idle past the timeout are
    /// released, and arenas with scopes still open are warned about and,
    /// past the grace period, treated as leaked (fatal).
    pub fn tick(&self, dt: Duration) -> TickReport {
        self.inner.tick(dt)
    }

    /// Statistics over all registered arenas.
    pub fn stats(&self) -> ScratchStats {
        self.inner.stats()
    }

    /// Statistics of the calling thread's arena, if it has one.
    pub fn current_thread_stats(&self) -> Option<ArenaStats> {
        self.inner.arena_stats(std::thread::current().id())
    }

    /// Statistics of `thread`'s arena, if it has one.
    pub fn thread_stats(&self, thread: ThreadId) -> Option<ArenaStats> {
        self.inner.arena_stats(thread)
    }

    /// The frozen trace view of `thread`'s previous frame (trace mode only).
    pub fn trace_snapshot(&self, thread: ThreadId) -> Option<TraceView> {
        self.inner.trace_snapshot(thread)
    }

    /// Get the configuration.
    pub fn config(&self) -> &ScratchConfig {
        self.inner.config()
    }

    /// Ticks processed so far.
    pub fn frame_number(&self) -> u64 {
        self.inner.frame_number()
    }

    /// Number of registered arenas.
    pub fn arena_count(&self) -> usize {
        self.inner.arena_count()
    }

    /// Whether `thread` currently has a registered arena.
    pub fn is_registered(&self, thread: ThreadId) -> bool {
        self.inner.is_registered(thread)
    }

    /// Release the calling thread's arena now instead of at thread exit.
    ///
    /// Returns false if the thread had no arena. Open scopes raise FS005.
    pub fn release_current_thread(&self) -> bool {
        tls::release_current(&self.inner)
    }

    /// Release every arena. Arenas with open scopes raise FS005, which is
    /// fatal once all arenas have been processed.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for ScratchAlloc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchAlloc")
            .field("registry", &self.inner)
            .finish()
    }
}
