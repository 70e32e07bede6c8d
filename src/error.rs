//! Error type for fallible scratch operations.

use thiserror::Error;

/// Everything that can go wrong inside a scratch arena.
///
/// The infallible entry points (`push`, `alloc`, `realloc`) treat all of these
/// as fatal; the `try_*` variants hand them back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScratchError {
    /// The two bump cursors would cross, or the heap-mode budget is spent.
    #[error("scratch arena exhausted: requested {requested} bytes with {used} of {capacity} bytes in use")]
    OutOfMemory {
        requested: usize,
        used: usize,
        capacity: usize,
    },

    /// The system heap refused a heap-tracked allocation.
    #[error("system heap refused a {requested} byte scratch allocation")]
    HeapExhausted { requested: usize },

    /// Size/alignment pair that cannot be served.
    #[error("invalid scratch layout: size {size}, align {align}")]
    InvalidLayout { size: usize, align: usize },

    /// The arena's backing buffer could not be reserved.
    #[error("failed to reserve {capacity} bytes for a scratch arena")]
    ReserveFailed { capacity: usize },

    /// A scope was closed while a newer scope on the same arena was still open.
    #[error("scope closed out of order: expected depth {expected}, found depth {found}")]
    ScopeMismatch { expected: u32, found: u32 },

    /// A scope was closed on an arena that has nothing open.
    #[error("no open scope to close")]
    NoOpenScope,

    /// The arena was released and its memory returned.
    #[error("scratch arena already released")]
    ArenaReleased,
}

impl ScratchError {
    /// Whether this is a capacity failure (as opposed to call-discipline misuse).
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            ScratchError::OutOfMemory { .. } | ScratchError::HeapExhausted { .. } | ScratchError::ReserveFailed { .. }
        )
    }
}
