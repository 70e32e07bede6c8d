//! Alignment math shared by both arena strategies.

/// Alignment every allocation gets at minimum (matches `max_align_t`).
pub const NATURAL_ALIGNMENT: usize = 16;

/// Size of the length header stored in front of each bump allocation.
pub const HEADER_SIZE: usize = std::mem::size_of::<usize>();

/// Align a size or offset up to the given power-of-two alignment.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Align an offset down to the given power-of-two alignment.
#[inline]
pub const fn align_down(offset: usize, align: usize) -> usize {
    offset & !(align - 1)
}

/// Effective alignment for a request: the caller's, raised to the natural one.
#[inline]
pub fn effective_align(align: usize) -> usize {
    align.max(NATURAL_ALIGNMENT)
}

/// Checked variant of [`align_up`], `None` on overflow.
#[inline]
pub fn checked_align_up(size: usize, align: usize) -> Option<usize> {
    Some(size.checked_add(align - 1)? & !(align - 1))
}
