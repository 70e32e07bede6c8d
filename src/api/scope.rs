//! Scope handles for RAII-style scratch frames.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::allocators::ScopeId;
use crate::core::arena::SharedArena;
use crate::core::registry::Registry;
use crate::diagnostics::context::{CallSite, DiagContext};
use crate::diagnostics::kind::{FS001, FS004, FS006};
use crate::error::ScratchError;

/// One open scratch scope.
///
/// Everything allocated through the handle stays valid until the scope is
/// popped, explicitly or by dropping the handle. Scopes on one thread must
/// close in reverse order of opening.
///
/// A handle stays bound to the arena of the thread that pushed it. It may
/// be moved to another thread (a job resumed elsewhere) and keeps
/// allocating from that arena.
///
/// # Example
///
/// ```rust,no_run
/// use framescratch::ScratchAlloc;
///
/// let alloc = ScratchAlloc::with_defaults();
///
/// let scope = alloc.push();
/// let numbers = scope.alloc_slice_fill(256, 0u32);
/// numbers[0] = 7;
/// scope.pop(); // numbers is gone
/// ```
pub struct ScratchScope {
    arena: SharedArena,
    registry: Arc<Registry>,
    id: ScopeId,
    site: Option<CallSite>,
    popped: bool,
}

impl ScratchScope {
    pub(crate) fn new(arena: SharedArena, registry: Arc<Registry>, id: ScopeId, site: Option<CallSite>) -> Self {
        Self {
            arena,
            registry,
            id,
            site,
            popped: false,
        }
    }

    /// Logical depth of this scope on its arena (1 = outermost).
    pub fn depth(&self) -> u32 {
        self.id.depth
    }

    /// Where the scope was pushed, if recorded.
    pub fn site(&self) -> Option<CallSite> {
        self.site
    }

    /// Allocate `size` bytes aligned to `align`.
    pub fn try_alloc(&self, size: usize, align: usize) -> Result<NonNull<u8>, ScratchError> {
        // SAFETY: no previous block to resize.
        unsafe { self.arena.lock().alloc(self.id, size, align, None) }
    }

    /// Allocate memory for `layout`.
    pub fn try_alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, ScratchError> {
        self.try_alloc(layout.size(), layout.align())
    }

    /// Allocate `size` bytes aligned to `align`; exhaustion is fatal.
    pub fn alloc(&self, size: usize, align: usize) -> NonNull<u8> {
        self.try_alloc(size, align).unwrap_or_else(|err| self.fail(err))
    }

    /// Allocate memory for `layout`; exhaustion is fatal.
    pub fn alloc_layout(&self, layout: Layout) -> NonNull<u8> {
        self.alloc(layout.size(), layout.align())
    }

    /// Resize a block previously allocated through a scope on the same arena.
    ///
    /// Contents are preserved up to the smaller of the old and new sizes.
    /// The block is resized in place when it is the newest allocation of
    /// this scope; otherwise a fresh block is allocated and the bytes copied.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this scope's arena and still be live, and the
    /// old pointer must not be used afterwards.
    pub unsafe fn try_realloc(&self, ptr: NonNull<u8>, size: usize, align: usize) -> Result<NonNull<u8>, ScratchError> {
        self.arena.lock().alloc(self.id, size, align, Some(ptr))
    }

    /// Resize a block; exhaustion is fatal.
    ///
    /// # Safety
    ///
    /// Same contract as [`try_realloc`](Self::try_realloc).
    pub unsafe fn realloc(&self, ptr: NonNull<u8>, size: usize, align: usize) -> NonNull<u8> {
        self.try_realloc(ptr, size, align)
            .unwrap_or_else(|err| self.fail(err))
    }

    /// Move `value` into scratch memory. Its destructor never runs.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_value<T>(&self, value: T) -> &mut T {
        let ptr = self.alloc_layout(Layout::new::<T>()).cast::<T>();
        // SAFETY: freshly allocated, properly aligned and sized for T, and
        // valid for as long as `self` is borrowed.
        unsafe {
            ptr.as_ptr().write(value);
            &mut *ptr.as_ptr()
        }
    }

    /// Copy a slice into scratch memory.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> &mut [T] {
        let layout = Layout::for_value(src);
        let ptr = self.alloc_layout(layout).cast::<T>();
        // SAFETY: the block holds `src.len()` properly aligned Ts.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len());
            std::slice::from_raw_parts_mut(ptr.as_ptr(), src.len())
        }
    }

    /// Allocate `len` clones of `value`.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_fill<T: Clone>(&self, len: usize, value: T) -> &mut [T] {
        let layout = Layout::array::<T>(len).unwrap_or_else(|_| {
            self.fail(ScratchError::InvalidLayout {
                size: usize::MAX,
                align: std::mem::align_of::<T>(),
            })
        });
        let ptr = self.alloc_layout(layout).cast::<T>();
        // SAFETY: the block holds `len` properly aligned Ts; each slot is
        // written exactly once before the slice is formed.
        unsafe {
            for i in 0..len {
                ptr.as_ptr().add(i).write(value.clone());
            }
            std::slice::from_raw_parts_mut(ptr.as_ptr(), len)
        }
    }

    /// Copy a string into scratch memory.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_str(&self, src: &str) -> &mut str {
        let bytes = self.alloc_slice_copy(src.as_bytes());
        // SAFETY: copied from a valid str.
        unsafe { std::str::from_utf8_unchecked_mut(bytes) }
    }

    /// Close the scope, returning call-discipline errors instead of aborting.
    pub fn try_pop(mut self) -> Result<(), ScratchError> {
        self.popped = true;
        self.arena.lock().pop(self.id)
    }

    /// Close the scope. Popping out of order is fatal.
    pub fn pop(self) {
        let id = self.id;
        let arena = Arc::clone(&self.arena);
        let registry = Arc::clone(&self.registry);
        if let Err(err) = self.try_pop() {
            fail_with(&arena, &registry, id, err);
        }
    }

    fn fail(&self, err: ScratchError) -> ! {
        fail_with(&self.arena, &self.registry, self.id, err)
    }

    fn context(&self) -> DiagContext {
        scope_context(&self.arena, &self.registry, self.id)
    }
}

fn scope_context(arena: &SharedArena, registry: &Registry, id: ScopeId) -> DiagContext {
    let arena = arena.lock();
    let site = arena.scope_site(id.depth);
    arena.context(registry.frame_number()).with_scope(site, id.depth)
}

fn fail_with(arena: &SharedArena, registry: &Registry, id: ScopeId, err: ScratchError) -> ! {
    let context = scope_context(arena, registry, id);
    let diagnostic = match err {
        ScratchError::OutOfMemory { .. } | ScratchError::ReserveFailed { .. } => FS001,
        ScratchError::HeapExhausted { .. } => FS006,
        ScratchError::ScopeMismatch { .. } | ScratchError::NoOpenScope | ScratchError::ArenaReleased => {
            FS004
        }
        ScratchError::InvalidLayout { .. } => panic!("{err}"),
    };
    registry.emitter().fatal(&diagnostic, &context, &err)
}

impl Drop for ScratchScope {
    fn drop(&mut self) {
        if self.popped {
            return;
        }
        self.popped = true;

        let result = self.arena.lock().pop(self.id);
        if let Err(err) = result {
            if std::thread::panicking() {
                self.registry.emitter().notify(&FS004, &self.context());
            } else {
                self.fail(err);
            }
        }
    }
}

impl std::fmt::Debug for ScratchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchScope")
            .field("depth", &self.id.depth)
            .field("site", &self.site)
            .field("popped", &self.popped)
            .finish()
    }
}
