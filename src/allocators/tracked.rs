//! Heap-tracked strategy.
//!
//! Same push/alloc/realloc/pop contract as the bump strategy, but every
//! block comes from the system heap and is recorded in a flat item list, so
//! external memory checkers see each scratch allocation individually. A pop
//! frees exactly the items its own frame allocated.

use std::alloc::Layout;
use std::ptr::NonNull;

use super::heap::SystemHeap;
use super::{check_scope, check_top, Grant, Request, ScopeId, ScratchStrategy};
use crate::diagnostics::context::CallSite;
use crate::diagnostics::trace::AllocSide;
use crate::error::ScratchError;

/// One live heap block.
#[derive(Debug)]
struct TrackedItem {
    ptr: NonNull<u8>,
    layout: Layout,
    /// Requested size, as opposed to `layout.size()`.
    size: usize,
    /// Serial of the frame the block belongs to.
    owner: u64,
    site: Option<CallSite>,
}

#[derive(Debug)]
struct TrackedFrame {
    serial: u64,
    item_index_at_open: usize,
    site: Option<CallSite>,
}

/// Arena whose allocations are individual system heap blocks.
pub(crate) struct HeapTrackedArena {
    heap: SystemHeap,
    frames: Vec<TrackedFrame>,
    items: Vec<TrackedItem>,
    /// Byte budget, matching the bump arena's capacity.
    budget: usize,
    used: usize,
    peak: usize,
    frame_peak: usize,
}

// SAFETY: the item pointers are heap blocks exclusively owned by the arena.
unsafe impl Send for HeapTrackedArena {}

impl HeapTrackedArena {
    /// Create an empty arena that may hold up to `budget` bytes at once.
    pub fn new(budget: usize) -> Self {
        Self {
            heap: SystemHeap::new(),
            frames: Vec::with_capacity(16),
            items: Vec::new(),
            budget,
            used: 0,
            peak: 0,
            frame_peak: 0,
        }
    }

    fn record_usage(&mut self) {
        debug_assert_eq!(self.used, self.heap.allocated_bytes());
        self.peak = self.peak.max(self.used);
        self.frame_peak = self.frame_peak.max(self.used);
    }

    fn index_of(&self, scope: ScopeId) -> Result<usize, ScratchError> {
        check_scope(
            |i| self.frames.get(i).map(|f| f.serial),
            self.open_depth(),
            scope,
        )
    }

    fn check_budget(&self, requested: usize, released: usize, aligned: usize) -> Result<(), ScratchError> {
        let after = (self.used - released).checked_add(aligned);
        match after {
            Some(after) if after <= self.budget => Ok(()),
            _ => Err(ScratchError::OutOfMemory {
                requested,
                used: self.used,
                capacity: self.budget,
            }),
        }
    }

    fn layout_for(req: &Request) -> Result<Layout, ScratchError> {
        Layout::from_size_align(req.aligned_size, req.align).map_err(|_| ScratchError::InvalidLayout {
            size: req.size,
            align: req.align,
        })
    }

    fn heap_alloc(&mut self, req: &Request) -> Result<(NonNull<u8>, Layout), ScratchError> {
        let layout = Self::layout_for(req)?;
        let ptr = self
            .heap
            .alloc(layout)
            .ok_or(ScratchError::HeapExhausted { requested: req.size })?;
        Ok((ptr, layout))
    }

    /// Hand the item at `slot` to the frame at `index`.
    ///
    /// The item moves to the tail of the list so every frame's items stay at
    /// or after its `item_index_at_open`.
    fn adopt(&mut self, slot: usize, index: usize) {
        let frame = &self.frames[index];
        let (owner, site) = (frame.serial, frame.site);
        if self.items[slot].owner == owner {
            return;
        }

        let mut item = self.items.remove(slot);
        for frame in &mut self.frames {
            if frame.item_index_at_open > slot {
                frame.item_index_at_open -= 1;
            }
        }
        item.owner = owner;
        item.site = site;
        self.items.push(item);
    }

    /// Bytes the system heap currently holds for this arena.
    #[cfg(test)]
    fn heap_bytes(&self) -> usize {
        self.heap.allocated_bytes()
    }
}

impl ScratchStrategy for HeapTrackedArena {
    fn push(&mut self, serial: u64, site: Option<CallSite>) -> u32 {
        self.frames.push(TrackedFrame {
            serial,
            item_index_at_open: self.items.len(),
            site,
        });
        self.frames.len() as u32
    }

    fn pop(&mut self, scope: ScopeId) -> Result<(), ScratchError> {
        check_top(self.frames.last().map(|f| f.serial), self.open_depth(), scope)?;
        let Some(frame) = self.frames.pop() else {
            return Err(ScratchError::NoOpenScope);
        };

        // Items of older frames allocated while this one was open stay live.
        let start = frame.item_index_at_open.min(self.items.len());
        let tail = self.items.split_off(start);
        for item in tail {
            if item.owner == frame.serial {
                self.used -= item.layout.size();
                // SAFETY: the item was allocated by `self.heap` with this layout.
                unsafe { self.heap.dealloc(item.ptr, item.layout) };
            } else {
                self.items.push(item);
            }
        }
        debug_assert_eq!(self.items.len(), self.heap.live_blocks());
        Ok(())
    }

    fn alloc(&mut self, scope: ScopeId, size: usize, align: usize) -> Result<Grant, ScratchError> {
        let req = Request::new(size, align)?;
        let index = self.index_of(scope)?;
        if req.is_zero_sized() {
            return Ok(Grant {
                ptr: req.dangling(),
                side: AllocSide::Heap,
            });
        }

        self.check_budget(size, 0, req.aligned_size)?;
        let (ptr, layout) = self.heap_alloc(&req)?;
        let frame = &self.frames[index];
        self.items.push(TrackedItem {
            ptr,
            layout,
            size,
            owner: frame.serial,
            site: frame.site,
        });
        self.used += layout.size();
        self.record_usage();

        Ok(Grant {
            ptr,
            side: AllocSide::Heap,
        })
    }

    unsafe fn realloc(
        &mut self,
        scope: ScopeId,
        ptr: NonNull<u8>,
        size: usize,
        align: usize,
    ) -> Result<Grant, ScratchError> {
        let req = Request::new(size, align)?;
        let index = self.index_of(scope)?;
        if req.is_zero_sized() {
            return Ok(Grant {
                ptr: req.dangling(),
                side: AllocSide::Heap,
            });
        }

        let Some(slot) = self.items.iter().rposition(|item| item.ptr == ptr) else {
            return self.alloc(scope, size, align);
        };
        let (old_ptr, old_layout, old_size) = {
            let item = &self.items[slot];
            (item.ptr, item.layout, item.size)
        };
        self.check_budget(size, old_layout.size(), req.aligned_size)?;

        let (new_ptr, new_layout) = if old_layout.align() == req.align {
            let new_layout = Self::layout_for(&req)?;
            let moved = self
                .heap
                .realloc(old_ptr, old_layout, new_layout.size())
                .ok_or(ScratchError::HeapExhausted { requested: size })?;
            (moved, new_layout)
        } else {
            let (fresh, new_layout) = self.heap_alloc(&req)?;
            std::ptr::copy_nonoverlapping(old_ptr.as_ptr(), fresh.as_ptr(), old_size.min(size));
            self.heap.dealloc(old_ptr, old_layout);
            (fresh, new_layout)
        };

        let item = &mut self.items[slot];
        item.ptr = new_ptr;
        item.layout = new_layout;
        item.size = size;
        self.adopt(slot, index);
        self.used = self.used - old_layout.size() + new_layout.size();
        self.record_usage();

        Ok(Grant {
            ptr: new_ptr,
            side: AllocSide::Heap,
        })
    }

    fn reset(&mut self) {
        debug_assert!(self.frames.is_empty(), "reset with open scratch frames");
        debug_assert!(self.items.is_empty());
        self.frame_peak = 0;
    }

    fn open_depth(&self) -> u32 {
        self.frames.len() as u32
    }

    fn scope_site(&self, depth: u32) -> Option<CallSite> {
        self.frames.get((depth as usize).checked_sub(1)?)?.site
    }

    fn capacity(&self) -> usize {
        self.budget
    }

    fn usage(&self) -> usize {
        self.used
    }

    fn peak(&self) -> usize {
        self.peak
    }

    fn frame_peak(&self) -> usize {
        self.frame_peak
    }

    fn tracked_items(&self) -> usize {
        self.items.len()
    }
}

impl Drop for HeapTrackedArena {
    fn drop(&mut self) {
        for item in self.items.drain(..) {
            if let Some(site) = item.site {
                log::trace!(
                    "freeing {} byte scratch block still held at release, pushed at {}:{}",
                    item.size,
                    site.file(),
                    site.line()
                );
            }
            // SAFETY: the item was allocated by `self.heap` with this layout.
            unsafe { self.heap.dealloc(item.ptr, item.layout) };
        }
        log::trace!(
            "heap-tracked arena dropped after {} heap allocations",
            self.heap.allocation_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(arena: &mut HeapTrackedArena, serial: u64) -> ScopeId {
        let depth = arena.push(serial, None);
        ScopeId { depth, serial }
    }

    #[test]
    fn test_items_balance_across_push_pop() {
        let mut arena = HeapTrackedArena::new(1 << 20);
        let outer = open(&mut arena, 1);
        arena.alloc(outer, 32, 8).unwrap();
        let before = arena.tracked_items();

        let inner = open(&mut arena, 2);
        for _ in 0..10 {
            arena.alloc(inner, 100, 8).unwrap();
        }
        assert_eq!(arena.tracked_items(), before + 10);

        arena.pop(inner).unwrap();
        assert_eq!(arena.tracked_items(), before);

        arena.pop(outer).unwrap();
        assert_eq!(arena.tracked_items(), 0);
        assert_eq!(arena.usage(), 0);
        assert_eq!(arena.heap_bytes(), 0);
    }

    #[test]
    fn test_pop_keeps_older_frame_items() {
        let mut arena = HeapTrackedArena::new(1 << 20);
        let outer = open(&mut arena, 1);
        let inner = open(&mut arena, 2);

        let kept = arena.alloc(outer, 64, 8).unwrap();
        unsafe { kept.ptr.as_ptr().write_bytes(3, 64) };
        arena.alloc(inner, 64, 8).unwrap();

        arena.pop(inner).unwrap();
        assert_eq!(arena.tracked_items(), 1);
        assert_eq!(unsafe { kept.ptr.as_ptr().add(63).read() }, 3);

        arena.pop(outer).unwrap();
        assert_eq!(arena.tracked_items(), 0);
    }

    #[test]
    fn test_budget_is_enforced() {
        let mut arena = HeapTrackedArena::new(4096);
        let outer = open(&mut arena, 1);
        let inner = open(&mut arena, 2);

        arena.alloc(inner, 3000, 8).unwrap();
        assert!(matches!(
            arena.alloc(outer, 1200, 8),
            Err(ScratchError::OutOfMemory { requested: 1200, .. })
        ));
    }

    #[test]
    fn test_realloc_updates_item_in_place() {
        let mut arena = HeapTrackedArena::new(1 << 20);
        let scope = open(&mut arena, 1);

        let grant = arena.alloc(scope, 16, 8).unwrap();
        unsafe { grant.ptr.as_ptr().write_bytes(0x11, 16) };

        let grown = unsafe { arena.realloc(scope, grant.ptr, 512, 8) }.unwrap();
        assert_eq!(arena.tracked_items(), 1);
        assert_eq!(arena.usage(), 512);
        assert_eq!(unsafe { grown.ptr.as_ptr().add(15).read() }, 0x11);

        let realigned = unsafe { arena.realloc(scope, grown.ptr, 64, 64) }.unwrap();
        assert_eq!(arena.tracked_items(), 1);
        assert_eq!(realigned.ptr.as_ptr() as usize % 64, 0);
        assert_eq!(unsafe { realigned.ptr.as_ptr().read() }, 0x11);

        arena.pop(scope).unwrap();
        assert_eq!(arena.heap_bytes(), 0);
    }

    #[test]
    fn test_realloc_from_outer_scope_survives_inner_pop() {
        let mut arena = HeapTrackedArena::new(1 << 20);
        let outer = open(&mut arena, 1);
        let inner = open(&mut arena, 2);

        let first = arena.alloc(inner, 16, 8).unwrap();
        unsafe { first.ptr.as_ptr().write_bytes(0x5A, 16) };
        let moved = unsafe { arena.realloc(outer, first.ptr, 32, 8) }.unwrap();
        arena.alloc(inner, 64, 8).unwrap();

        arena.pop(inner).unwrap();
        assert_eq!(arena.tracked_items(), 1);
        assert_eq!(arena.usage(), 32);
        assert_eq!(arena.heap_bytes(), 32);
        assert_eq!(unsafe { moved.ptr.as_ptr().add(15).read() }, 0x5A);

        arena.pop(outer).unwrap();
        assert_eq!(arena.tracked_items(), 0);
        assert_eq!(arena.heap_bytes(), 0);
    }

    #[test]
    fn test_adopted_item_keeps_later_frames_balanced() {
        let mut arena = HeapTrackedArena::new(1 << 20);
        let outer = open(&mut arena, 1);
        let middle = open(&mut arena, 2);
        let old = arena.alloc(outer, 16, 8).unwrap();

        let inner = open(&mut arena, 3);
        arena.alloc(inner, 24, 8).unwrap();
        // The middle frame takes over a block that sits before the inner
        // frame's first item.
        unsafe { arena.realloc(middle, old.ptr, 48, 8) }.unwrap();

        arena.pop(inner).unwrap();
        assert_eq!(arena.tracked_items(), 1);
        assert_eq!(arena.usage(), 48);

        arena.pop(middle).unwrap();
        assert_eq!(arena.tracked_items(), 0);
        arena.pop(outer).unwrap();
        assert_eq!(arena.heap_bytes(), 0);
    }

    #[test]
    fn test_unknown_pointer_realloc_allocates() {
        let mut arena = HeapTrackedArena::new(1 << 20);
        let scope = open(&mut arena, 1);
        let grant = unsafe { arena.realloc(scope, NonNull::dangling(), 32, 8) }.unwrap();
        assert_eq!(grant.side, AllocSide::Heap);
        assert_eq!(arena.tracked_items(), 1);
        arena.pop(scope).unwrap();
    }

    #[test]
    fn test_drop_frees_remaining_items() {
        let mut arena = HeapTrackedArena::new(1 << 20);
        let scope = open(&mut arena, 1);
        arena.alloc(scope, 128, 8).unwrap();
        drop(arena);
    }
}
