//! Per-thread arena: one strategy plus lifecycle bookkeeping.

use std::ptr::NonNull;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use crate::allocators::bump::BumpArena;
use crate::allocators::tracked::HeapTrackedArena;
use crate::allocators::{Grant, ScopeId, ScratchStrategy};
use crate::api::config::{ArenaMode, ScratchConfig};
use crate::api::stats::ArenaStats;
use crate::diagnostics::context::{CallSite, DiagContext};
use crate::diagnostics::trace::{TraceEvent, TraceView, TraceViews};
use crate::error::ScratchError;
use crate::sync::mutex::Mutex;

/// Arena shared between the registry, the owning thread's cache and the
/// scope handles pushed on it.
pub(crate) type SharedArena = Arc<Mutex<ThreadArena>>;

/// The strategy an arena was created with.
pub(crate) enum Backend {
    Bump(BumpArena),
    Heap(HeapTrackedArena),
}

impl Backend {
    fn create(mode: ArenaMode, capacity: usize) -> Result<Self, ScratchError> {
        Ok(match mode {
            ArenaMode::Bump => Backend::Bump(BumpArena::new(capacity)?),
            ArenaMode::HeapTracked => Backend::Heap(HeapTrackedArena::new(capacity)),
        })
    }

    fn strategy(&self) -> &dyn ScratchStrategy {
        match self {
            Backend::Bump(arena) => arena,
            Backend::Heap(arena) => arena,
        }
    }

    fn strategy_mut(&mut self) -> &mut dyn ScratchStrategy {
        match self {
            Backend::Bump(arena) => arena,
            Backend::Heap(arena) => arena,
        }
    }
}

/// What a tick did to one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickAction {
    /// Idle: rewound to empty.
    Reset,
    /// Idle past the timeout: released and to be unregistered.
    Evict,
    /// Scopes still open.
    Open {
        /// Raise the open-scope warning now.
        warn: bool,
        /// Open past the grace period.
        leaked: bool,
    },
}

/// Scratch state of one thread.
pub(crate) struct ThreadArena {
    thread_id: ThreadId,
    thread_name: Option<String>,
    mode: ArenaMode,
    /// `None` once released.
    backend: Option<Backend>,
    next_serial: u64,
    idle_time: Duration,
    /// Time scopes have been held open across ticks.
    wait_time: Duration,
    warned: bool,
    trace: Option<TraceViews>,
    released: bool,
}

impl ThreadArena {
    /// Create an arena owned by the calling thread.
    pub fn new(config: &ScratchConfig) -> Result<Self, ScratchError> {
        let capacity = config.effective_capacity();
        let backend = Backend::create(config.mode, capacity)?;
        let thread = std::thread::current();

        log::info!(
            "(init) scratch arena created on thread {}: {} kb, {}",
            thread.name().unwrap_or("<unnamed>"),
            capacity / 1024,
            config.mode
        );

        Ok(Self {
            thread_id: thread.id(),
            thread_name: thread.name().map(String::from),
            mode: config.mode,
            backend: Some(backend),
            next_serial: 1,
            idle_time: Duration::ZERO,
            wait_time: Duration::ZERO,
            warned: false,
            trace: config.trace.then(TraceViews::new),
            released: false,
        })
    }

    fn backend(&mut self) -> Result<&mut dyn ScratchStrategy, ScratchError> {
        self.backend
            .as_mut()
            .map(Backend::strategy_mut)
            .ok_or(ScratchError::ArenaReleased)
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn open_depth(&self) -> u32 {
        self.backend.as_ref().map_or(0, |b| b.strategy().open_depth())
    }

    /// Diagnostic context naming this arena's thread.
    pub fn context(&self, frame_number: u64) -> DiagContext {
        DiagContext::for_thread(frame_number, self.thread_id, self.thread_name.clone())
    }

    /// Call site of the frame at `depth`.
    pub fn scope_site(&self, depth: u32) -> Option<CallSite> {
        self.backend.as_ref()?.strategy().scope_site(depth)
    }

    /// Open a scope frame.
    pub fn push(&mut self, site: Option<CallSite>) -> Result<ScopeId, ScratchError> {
        let serial = self.next_serial;
        let depth = self.backend()?.push(serial, site);
        self.next_serial += 1;
        self.idle_time = Duration::ZERO;
        Ok(ScopeId { depth, serial })
    }

    /// Close a scope frame.
    pub fn pop(&mut self, scope: ScopeId) -> Result<(), ScratchError> {
        self.backend()?.pop(scope)?;
        self.idle_time = Duration::ZERO;
        Ok(())
    }

    /// Allocate under `scope`, resizing `previous` when given.
    ///
    /// # Safety
    ///
    /// `previous`, when present, must satisfy [`ScratchStrategy::realloc`].
    pub unsafe fn alloc(
        &mut self,
        scope: ScopeId,
        size: usize,
        align: usize,
        previous: Option<NonNull<u8>>,
    ) -> Result<NonNull<u8>, ScratchError> {
        let strategy = self.backend()?;
        let grant: Grant = match previous {
            Some(ptr) => strategy.realloc(scope, ptr, size, align)?,
            None => strategy.alloc(scope, size, align)?,
        };
        let usage = strategy.usage();
        let site = strategy.scope_site(scope.depth);

        if let Some(trace) = self.trace.as_mut() {
            trace.record(
                TraceEvent {
                    size,
                    align,
                    side: grant.side,
                    depth: scope.depth,
                    site,
                    realloc: previous.is_some(),
                    callstack: None,
                },
                usage,
            );
        }
        self.idle_time = Duration::ZERO;
        Ok(grant.ptr)
    }

    /// Advance this arena by one frame.
    pub fn tick(&mut self, dt: Duration, config: &ScratchConfig, frame_number: u64) -> TickAction {
        self.idle_time += dt;
        let depth = self.open_depth();

        let action = if depth == 0 {
            if self.idle_time > config.idle_timeout {
                return TickAction::Evict;
            }
            if let Some(backend) = self.backend.as_mut() {
                backend.strategy_mut().reset();
            }
            self.wait_time = Duration::ZERO;
            self.warned = false;
            log::trace!("scratch arena on {:?} reset at frame {}", self.thread_id, frame_number);
            TickAction::Reset
        } else {
            self.wait_time += dt;
            let leaked = self.wait_time > config.leak_grace;
            let warn = !leaked && !self.warned && self.wait_time > config.leak_warning_after;
            self.warned |= warn;
            TickAction::Open { warn, leaked }
        };

        if let Some(trace) = self.trace.as_mut() {
            trace.swap(frame_number);
        }
        action
    }

    /// Release the arena's memory. Returns false when scopes were still
    /// open; their memory then lives until the last handle is dropped.
    pub fn release(&mut self) -> bool {
        self.released = true;
        if self.open_depth() == 0 {
            self.backend = None;
            true
        } else {
            false
        }
    }

    /// Frozen trace view of the previous frame.
    pub fn trace_snapshot(&self) -> Option<TraceView> {
        self.trace.as_ref().map(|t| t.back().clone())
    }

    pub fn peak(&self) -> usize {
        self.backend.as_ref().map_or(0, |b| b.strategy().peak())
    }

    pub fn frame_peak(&self) -> usize {
        self.backend.as_ref().map_or(0, |b| b.strategy().frame_peak())
    }

    pub fn stats(&self) -> ArenaStats {
        let strategy = self.backend.as_ref().map(Backend::strategy);
        ArenaStats {
            thread_id: self.thread_id,
            thread_name: self.thread_name.clone(),
            mode: self.mode,
            capacity: strategy.map_or(0, |s| s.capacity()),
            open_depth: strategy.map_or(0, |s| s.open_depth()),
            usage: strategy.map_or(0, |s| s.usage()),
            peak_usage: strategy.map_or(0, |s| s.peak()),
            frame_peak_usage: strategy.map_or(0, |s| s.frame_peak()),
            idle_time: self.idle_time,
            tracked_items: strategy.map_or(0, |s| s.tracked_items()),
        }
    }
}
