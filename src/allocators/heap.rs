//! System heap wrapper for heap-tracked scratch arenas.

use std::alloc::{alloc, dealloc, realloc, Layout};
use std::ptr::NonNull;

/// Wrapper around the system allocator that keeps byte and block counts.
///
/// Owned by a single arena, so the counters need no synchronization.
#[derive(Debug, Default)]
pub struct SystemHeap {
    /// Total bytes currently allocated
    allocated_bytes: usize,

    /// Blocks currently allocated
    live_blocks: usize,

    /// Total allocation count
    allocation_count: usize,
}

impl SystemHeap {
    /// Create a new system heap wrapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate memory with the given non-zero-sized layout.
    pub fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);

        // SAFETY: Using system allocator with a non-zero-sized layout
        let ptr = NonNull::new(unsafe { alloc(layout) })?;

        #[cfg(feature = "debug")]
        // SAFETY: freshly allocated block of `layout.size()` bytes.
        crate::debug::poison::poison_uninit(unsafe {
            std::slice::from_raw_parts_mut(ptr.as_ptr(), layout.size())
        });

        self.allocated_bytes += layout.size();
        self.live_blocks += 1;
        self.allocation_count += 1;
        Some(ptr)
    }

    /// Deallocate memory.
    ///
    /// # Safety
    ///
    /// The pointer must have been allocated by this heap with the same layout.
    pub unsafe fn dealloc(&mut self, ptr: NonNull<u8>, layout: Layout) {
        // Poison memory before freeing in debug mode
        #[cfg(feature = "debug")]
        crate::debug::poison::poison_freed(std::slice::from_raw_parts_mut(ptr.as_ptr(), layout.size()));

        dealloc(ptr.as_ptr(), layout);

        self.allocated_bytes -= layout.size();
        self.live_blocks -= 1;
    }

    /// Resize a block, keeping its alignment.
    ///
    /// On failure the old block is untouched and still owned by the caller.
    ///
    /// # Safety
    ///
    /// The pointer must have been allocated by this heap with `layout`, and
    /// `new_size` must be non-zero.
    pub unsafe fn realloc(&mut self, ptr: NonNull<u8>, layout: Layout, new_size: usize) -> Option<NonNull<u8>> {
        debug_assert!(new_size > 0);
        let moved = NonNull::new(realloc(ptr.as_ptr(), layout, new_size))?;

        self.allocated_bytes = self.allocated_bytes - layout.size() + new_size;
        Some(moved)
    }

    /// Get total bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Get the number of blocks currently allocated.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Get total allocation count.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }
}
