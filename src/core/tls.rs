//! Thread-local arena cache.
//!
//! Each thread remembers the arena it owns in every live allocator, so the
//! push fast path skips the registry lock. When the thread exits, the cache
//! is dropped and every arena it still holds is released.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use crate::core::arena::SharedArena;
use crate::core::registry::Registry;
use crate::error::ScratchError;

struct CachedArena {
    registry: Weak<Registry>,
    registry_id: u64,
    arena: SharedArena,
}

#[derive(Default)]
struct LocalArenas {
    entries: Vec<CachedArena>,
}

impl Drop for LocalArenas {
    fn drop(&mut self) {
        for entry in self.entries.drain(..) {
            if let Some(registry) = entry.registry.upgrade() {
                // Thread-exit release: report open scopes, never panic here.
                registry.release(&entry.arena, false);
            }
        }
    }
}

thread_local! {
    static LOCAL: RefCell<LocalArenas> = RefCell::new(LocalArenas::default());
}

/// The calling thread's arena in `registry`, registering one on first use
/// or after the previous one was released.
pub(crate) fn current_arena(registry: &Arc<Registry>) -> Result<SharedArena, ScratchError> {
    let cached = LOCAL.try_with(|local| {
        let Ok(mut local) = local.try_borrow_mut() else {
            return registry.arena_for_current();
        };
        local.entries.retain(|e| e.registry.strong_count() > 0);

        let slot = local.entries.iter().position(|e| e.registry_id == registry.id());
        if let Some(index) = slot {
            let arena = &local.entries[index].arena;
            if !arena.lock().is_released() {
                return Ok(Arc::clone(arena));
            }
            local.entries.swap_remove(index);
        }

        let arena = registry.arena_for_current()?;
        local.entries.push(CachedArena {
            registry: Arc::downgrade(registry),
            registry_id: registry.id(),
            arena: Arc::clone(&arena),
        });
        Ok(arena)
    });

    // Thread-local storage is being torn down: go through the registry.
    cached.unwrap_or_else(|_| registry.arena_for_current())
}

/// Drop the calling thread's cache entry for `registry` and release its arena.
pub(crate) fn release_current(registry: &Registry) -> bool {
    let _ = LOCAL.try_with(|local| {
        if let Ok(mut local) = local.try_borrow_mut() {
            local.entries.retain(|e| e.registry_id != registry.id());
        }
    });
    registry.release_thread(std::thread::current().id())
}
