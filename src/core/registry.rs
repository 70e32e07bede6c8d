//! Process-wide arena registry and the per-frame tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use crate::api::config::ScratchConfig;
use crate::api::stats::{ArenaStats, ScratchStats, TickReport};
use crate::core::arena::{SharedArena, ThreadArena, TickAction};
use crate::diagnostics::context::DiagContext;
use crate::diagnostics::emit::{DiagnosticSink, Emitter};
use crate::diagnostics::kind::{Diagnostic, FS002, FS003, FS005};
use crate::diagnostics::profiler::{self, TickPlot};
use crate::diagnostics::trace::TraceView;
use crate::error::ScratchError;
use crate::sync::atomics::{AtomicCounter, AtomicPeak};
use crate::sync::mutex::Mutex;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// A diagnostic gathered under the locks, emitted after they are dropped.
struct Pending {
    diagnostic: Diagnostic,
    context: DiagContext,
    fatal: bool,
}

/// All live arenas of one allocator.
///
/// Lock order is registry map first, then arena.
pub(crate) struct Registry {
    id: u64,
    config: ScratchConfig,
    emitter: Emitter,
    arenas: Mutex<HashMap<ThreadId, SharedArena>>,
    frame_number: AtomicCounter,
    created: AtomicCounter,
    evicted: AtomicCounter,
    peak_usage: AtomicPeak,
}

impl Registry {
    pub fn new(config: ScratchConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        let emitter = Emitter::new(sink, config.strict);
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            config,
            emitter,
            arenas: Mutex::new(HashMap::new()),
            frame_number: AtomicCounter::new(0),
            created: AtomicCounter::new(0),
            evicted: AtomicCounter::new(0),
            peak_usage: AtomicPeak::new(),
        }
    }

    /// Process-unique id, used to key per-thread caches.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ScratchConfig {
        &self.config
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number.get()
    }

    /// The calling thread's registered arena, creating one if needed.
    pub fn arena_for_current(&self) -> Result<SharedArena, ScratchError> {
        let thread_id = std::thread::current().id();
        let mut arenas = self.arenas.lock();

        if let Some(existing) = arenas.get(&thread_id) {
            if !existing.lock().is_released() {
                return Ok(Arc::clone(existing));
            }
        }

        let arena = Arc::new(Mutex::new(ThreadArena::new(&self.config)?));
        arenas.insert(thread_id, Arc::clone(&arena));
        self.created.increment();
        Ok(arena)
    }

    /// Unregister and release `arena`.
    ///
    /// Returns false if it had already been released. Open scopes raise
    /// FS005; with `escalate` unset the report never panics.
    pub fn release(&self, arena: &SharedArena, escalate: bool) -> bool {
        let (clean, context) = {
            let mut arenas = self.arenas.lock();
            let mut guard = arena.lock();
            if guard.is_released() {
                return false;
            }
            let thread_id = guard.thread_id();
            if arenas.get(&thread_id).is_some_and(|a| Arc::ptr_eq(a, arena)) {
                arenas.remove(&thread_id);
            }

            let depth = guard.open_depth();
            let context = guard
                .context(self.frame_number())
                .with_scope(guard.scope_site(1), depth);
            self.peak_usage.update_max(guard.peak());
            (guard.release(), context)
        };

        log::debug!("scratch arena on {:?} released", context.thread_id);
        if !clean {
            if escalate {
                self.emitter.emit(&FS005, &context);
            } else {
                self.emitter.notify(&FS005, &context);
            }
        }
        true
    }

    /// Release the calling thread's arena, if it has one registered.
    pub fn release_thread(&self, thread_id: ThreadId) -> bool {
        let arena = self.arenas.lock().get(&thread_id).cloned();
        match arena {
            Some(arena) => self.release(&arena, true),
            None => false,
        }
    }

    /// Validate, reset or evict every arena, then advance the frame number.
    pub fn tick(&self, dt: Duration) -> TickReport {
        let frame_number = self.frame_number.increment();
        let mut report = TickReport {
            frame_number,
            ..TickReport::default()
        };
        let mut pending = Vec::new();
        let mut plot = TickPlot::default();

        {
            let mut arenas = self.arenas.lock();
            arenas.retain(|_, shared| {
                let mut arena = shared.lock();
                self.peak_usage.update_max(arena.peak());
                plot.frame_peak = plot.frame_peak.max(arena.frame_peak());

                match arena.tick(dt, &self.config, frame_number) {
                    TickAction::Reset => {
                        report.reset += 1;
                        true
                    }
                    TickAction::Evict => {
                        arena.release();
                        report.evicted += 1;
                        self.evicted.increment();
                        log::debug!(
                            "scratch arena on {:?} evicted after {:?} idle",
                            arena.thread_id(),
                            self.config.idle_timeout
                        );
                        false
                    }
                    TickAction::Open { warn, leaked } => {
                        report.open += 1;
                        plot.open_scopes += arena.open_depth() as usize;
                        if leaked || warn {
                            // The outermost frame is the one holding everything open.
                            let context = arena
                                .context(frame_number)
                                .with_scope(arena.scope_site(1), 1);
                            pending.push(Pending {
                                diagnostic: if leaked { FS003 } else { FS002 },
                                context,
                                fatal: leaked,
                            });
                        }
                        report.warnings += usize::from(warn);
                        true
                    }
                }
            });
            plot.live_arenas = arenas.len();
        }

        profiler::plot_tick(plot);

        let mut fatal = None;
        for item in pending {
            if item.fatal {
                self.emitter.notify(&item.diagnostic, &item.context);
                fatal.get_or_insert(item);
            } else {
                self.emitter.emit(&item.diagnostic, &item.context);
            }
        }
        if let Some(item) = fatal {
            panic!(
                "[framescratch][{}] {}\nContext: {}",
                item.diagnostic.code,
                item.diagnostic.message,
                item.context.format()
            );
        }

        report
    }

    /// Release every arena. Arenas with open scopes raise FS005, fatal once
    /// all arenas have been processed.
    pub fn shutdown(&self) {
        let drained: Vec<SharedArena> = self.arenas.lock().drain().map(|(_, arena)| arena).collect();
        let mut dirty = Vec::new();

        for shared in drained {
            let mut arena = shared.lock();
            self.peak_usage.update_max(arena.peak());
            let context = arena
                .context(self.frame_number())
                .with_scope(arena.scope_site(1), arena.open_depth());
            if !arena.is_released() && !arena.release() {
                dirty.push(context);
            }
        }

        for context in &dirty {
            self.emitter.notify(&FS005, context);
        }
        if let Some(first) = dirty.first() {
            if !std::thread::panicking() {
                panic!(
                    "[framescratch][{}] {}: {} arena(s) still had open scopes\nContext: {}",
                    FS005.code,
                    FS005.message,
                    dirty.len(),
                    first.format()
                );
            }
        }
    }

    pub fn stats(&self) -> ScratchStats {
        let arenas: Vec<ArenaStats> = self.arenas.lock().values().map(|a| a.lock().stats()).collect();
        for arena in &arenas {
            self.peak_usage.update_max(arena.peak_usage);
        }
        ScratchStats {
            arenas,
            frame_number: self.frame_number(),
            arenas_created: self.created.get(),
            arenas_evicted: self.evicted.get(),
            peak_usage: self.peak_usage.get(),
        }
    }

    pub fn arena_stats(&self, thread_id: ThreadId) -> Option<ArenaStats> {
        let arena = self.arenas.lock().get(&thread_id).cloned()?;
        let stats = arena.lock().stats();
        Some(stats)
    }

    pub fn trace_snapshot(&self, thread_id: ThreadId) -> Option<TraceView> {
        let arena = self.arenas.lock().get(&thread_id).cloned()?;
        let view = arena.lock().trace_snapshot();
        view
    }

    pub fn arena_count(&self) -> usize {
        self.arenas.lock().len()
    }

    pub fn is_registered(&self, thread_id: ThreadId) -> bool {
        self.arenas.lock().contains_key(&thread_id)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("frame_number", &self.frame_number())
            .field("arenas", &self.arena_count())
            .finish()
    }
}
