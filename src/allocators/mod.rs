//! Arena strategies.
//!
//! Both strategies implement [`ScratchStrategy`] and serve the same
//! push / alloc / realloc / pop contract; a thread arena picks one at
//! creation and keeps it for its whole life.

pub(crate) mod buffer;
pub(crate) mod bump;
pub(crate) mod heap;
pub(crate) mod tracked;

use std::ptr::NonNull;

use crate::diagnostics::context::CallSite;
use crate::diagnostics::trace::AllocSide;
use crate::error::ScratchError;
use crate::util::layout::{checked_align_up, effective_align};
use crate::util::size::page_size;

/// Identifies one open scope frame inside an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScopeId {
    /// Logical depth at creation (1 = outermost).
    pub depth: u32,
    /// Arena-unique serial, so stale ids never match a reused depth.
    pub serial: u64,
}

/// A successful allocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Grant {
    pub ptr: NonNull<u8>,
    pub side: AllocSide,
}

/// Validated request: effective alignment and rounded size.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Request {
    pub size: usize,
    pub align: usize,
    pub aligned_size: usize,
}

impl Request {
    /// Round `size` up to the larger of the natural and requested alignment.
    pub fn new(size: usize, align: usize) -> Result<Self, ScratchError> {
        if !align.is_power_of_two() || align > page_size() {
            return Err(ScratchError::InvalidLayout { size, align });
        }
        let align = effective_align(align);
        let aligned_size =
            checked_align_up(size, align).ok_or(ScratchError::InvalidLayout { size, align })?;
        Ok(Self {
            size,
            align,
            aligned_size,
        })
    }

    /// Zero-sized requests consume nothing.
    pub fn is_zero_sized(&self) -> bool {
        self.size == 0
    }

    /// Well-aligned dangling pointer handed out for zero-sized requests.
    pub fn dangling(&self) -> NonNull<u8> {
        NonNull::new(self.align as *mut u8).unwrap_or(NonNull::dangling())
    }
}

/// The push / alloc / realloc / pop contract shared by both strategies.
pub(crate) trait ScratchStrategy: Send {
    /// Open a new frame on top of the stack and return its logical depth.
    fn push(&mut self, serial: u64, site: Option<CallSite>) -> u32;

    /// Close the top frame, which must be `scope`.
    fn pop(&mut self, scope: ScopeId) -> Result<(), ScratchError>;

    /// Allocate `size` bytes under `scope`.
    fn alloc(&mut self, scope: ScopeId, size: usize, align: usize) -> Result<Grant, ScratchError>;

    /// Resize an allocation made by this arena, in place when possible.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this arena and still be live, and no
    /// reference into the old block may be used after this call.
    unsafe fn realloc(
        &mut self,
        scope: ScopeId,
        ptr: NonNull<u8>,
        size: usize,
        align: usize,
    ) -> Result<Grant, ScratchError>;

    /// Return to the empty state. Only valid with no open frames.
    fn reset(&mut self);

    /// Number of open frames.
    fn open_depth(&self) -> u32;

    /// Call site recorded for the frame at `depth`.
    fn scope_site(&self, depth: u32) -> Option<CallSite>;

    /// Capacity budget in bytes.
    fn capacity(&self) -> usize;

    /// Bytes currently claimed.
    fn usage(&self) -> usize;

    /// Lifetime high-water mark.
    fn peak(&self) -> usize;

    /// High-water mark since the last reset.
    fn frame_peak(&self) -> usize;

    /// Live individually tracked allocations (heap mode only).
    fn tracked_items(&self) -> usize {
        0
    }
}

/// Check that `scope` is the frame at its depth in a stack of `serials`.
pub(crate) fn check_scope(serials: impl Fn(usize) -> Option<u64>, open: u32, scope: ScopeId) -> Result<usize, ScratchError> {
    if open == 0 {
        return Err(ScratchError::NoOpenScope);
    }
    let index = (scope.depth as usize).wrapping_sub(1);
    match serials(index) {
        Some(serial) if serial == scope.serial => Ok(index),
        _ => Err(ScratchError::ScopeMismatch {
            expected: open,
            found: scope.depth,
        }),
    }
}

/// Check that `scope` is the top frame, i.e. the only one `pop` may close.
pub(crate) fn check_top(top_serial: Option<u64>, open: u32, scope: ScopeId) -> Result<(), ScratchError> {
    match top_serial {
        None => Err(ScratchError::NoOpenScope),
        Some(serial) if serial == scope.serial && scope.depth == open => Ok(()),
        Some(_) => Err(ScratchError::ScopeMismatch {
            expected: open,
            found: scope.depth,
        }),
    }
}
