//! Arena buffer - one page-aligned byte range reserved per owning thread.
//!
//! All bookkeeping above this layer works in byte offsets; only this type
//! turns offsets into addresses.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::ScratchError;
use crate::util::layout::HEADER_SIZE;
use crate::util::size::page_size;

/// A fixed-capacity, page-aligned byte range.
pub struct ArenaBuffer {
    /// Base pointer of the buffer
    base: NonNull<u8>,

    /// Layout used for the reservation
    layout: Layout,
}

// SAFETY: the buffer exclusively owns its allocation; access is serialized by
// the arena mutex that wraps it.
unsafe impl Send for ArenaBuffer {}

impl ArenaBuffer {
    /// Reserve a buffer of exactly `capacity` bytes, aligned to the page size.
    pub fn new(capacity: usize) -> Result<Self, ScratchError> {
        let layout = Layout::from_size_align(capacity.max(1), page_size())
            .map_err(|_| ScratchError::ReserveFailed { capacity })?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc(layout) };
        let base = NonNull::new(ptr).ok_or(ScratchError::ReserveFailed { capacity })?;

        Ok(Self { base, layout })
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Address of the byte at `offset`.
    #[inline]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.capacity());
        // SAFETY: offset is within (or one past) the allocation.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Offset of `ptr` inside the buffer, if it points into it.
    #[inline]
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let base = self.base.as_ptr() as usize;
        let addr = ptr.as_ptr() as usize;
        if addr >= base && addr < base + self.capacity() {
            Some(addr - base)
        } else {
            None
        }
    }

    /// Read the size header stored in front of the block at `data_offset`.
    #[inline]
    pub fn read_header(&self, data_offset: usize) -> usize {
        assert!(data_offset >= HEADER_SIZE && data_offset <= self.capacity());
        // SAFETY: the header lies inside the buffer; it may be unaligned for
        // callers passing foreign offsets, so read it unaligned.
        unsafe {
            self.base
                .as_ptr()
                .add(data_offset - HEADER_SIZE)
                .cast::<usize>()
                .read_unaligned()
        }
    }

    /// Write the size header in front of the block at `data_offset`.
    #[inline]
    pub fn write_header(&mut self, data_offset: usize, size: usize) {
        assert!(data_offset >= HEADER_SIZE && data_offset <= self.capacity());
        // SAFETY: the header lies inside the buffer.
        unsafe {
            self.base
                .as_ptr()
                .add(data_offset - HEADER_SIZE)
                .cast::<usize>()
                .write_unaligned(size);
        }
    }

    /// Move `len` bytes from `src` to `dst`; the ranges may overlap.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        assert!(src + len <= self.capacity() && dst + len <= self.capacity());
        // SAFETY: both ranges are inside the buffer; `copy` handles overlap.
        unsafe {
            std::ptr::copy(
                self.base.as_ptr().add(src),
                self.base.as_ptr().add(dst),
                len,
            );
        }
    }

    /// Mutable view of a byte range no live allocation refers to.
    #[cfg(feature = "debug")]
    pub fn reclaimed_bytes(&mut self, start: usize, end: usize) -> &mut [u8] {
        assert!(start <= end && end <= self.capacity());
        // SAFETY: range is inside the buffer and, per the caller, unused.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(start), end - start) }
    }
}

impl Drop for ArenaBuffer {
    fn drop(&mut self) {
        // SAFETY: We allocated this memory in `new()` with this layout.
        unsafe {
            dealloc(self.base.as_ptr(), self.layout);
        }
    }
}

impl std::fmt::Debug for ArenaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaBuffer")
            .field("base", &self.base)
            .field("capacity", &self.capacity())
            .finish()
    }
}
