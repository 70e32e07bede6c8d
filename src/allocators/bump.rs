//! Dual-direction bump strategy.
//!
//! The newest open frame bumps down from the top end of the buffer. A frame
//! that allocates while newer frames are open on the same arena (a
//! collapsing frame, produced when a suspended job resumes underneath work
//! that was started after it) bumps up from the bottom end instead, so it
//! can never land on bytes the newer frames own. The direction is decided
//! per allocation by comparing the frame's creation depth with the arena's
//! current depth.
//!
//! ```text
//!  0                        bottom          capacity - top_end      capacity
//!  |== collapsing frames ==>|     free       |<== newest frame | older ==|
//! ```
//!
//! Every block is preceded by a `usize` header holding its requested size.
//! Nothing is freed per allocation; a pop gives back everything its frame
//! claimed on either end.

use std::ptr::NonNull;

use super::buffer::ArenaBuffer;
use super::{check_scope, check_top, Grant, Request, ScopeId, ScratchStrategy};
use crate::diagnostics::context::CallSite;
use crate::diagnostics::trace::AllocSide;
use crate::error::ScratchError;
use crate::util::layout::{align_down, align_up, HEADER_SIZE};

/// Most recent allocation of a frame, for in-place resizing.
#[derive(Debug, Clone, Copy)]
struct LastAlloc {
    side: AllocSide,
    /// Offset of the block's first data byte.
    offset: usize,
    /// Top side only: the offset the block may extend up to.
    limit: usize,
}

#[derive(Debug)]
struct BumpFrame {
    serial: u64,
    depth: u32,
    /// Bottom cursor, measured from the buffer start.
    start_cursor: usize,
    /// Top cursor, measured from the buffer end.
    end_cursor: usize,
    last: Option<LastAlloc>,
    site: Option<CallSite>,
}

/// Bump arena over one [`ArenaBuffer`].
pub(crate) struct BumpArena {
    buffer: ArenaBuffer,
    frames: Vec<BumpFrame>,
    /// Highest bottom cursor among open frames.
    bottom: usize,
    peak: usize,
    frame_peak: usize,
}

impl BumpArena {
    /// Create an arena over a freshly reserved buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self, ScratchError> {
        Ok(Self {
            buffer: ArenaBuffer::new(capacity)?,
            frames: Vec::with_capacity(16),
            bottom: 0,
            peak: 0,
            frame_peak: 0,
        })
    }

    /// Bytes claimed from the top end (by the newest frame and its ancestors).
    #[inline]
    fn top_end(&self) -> usize {
        self.frames.last().map_or(0, |f| f.end_cursor)
    }

    #[inline]
    fn used(&self) -> usize {
        self.bottom + self.top_end()
    }

    fn record_usage(&mut self) {
        let used = self.used();
        self.peak = self.peak.max(used);
        self.frame_peak = self.frame_peak.max(used);
    }

    fn out_of_memory(&self, requested: usize) -> ScratchError {
        ScratchError::OutOfMemory {
            requested,
            used: self.used(),
            capacity: self.buffer.capacity(),
        }
    }

    #[inline]
    fn side_for(&self, index: usize) -> AllocSide {
        if self.frames[index].depth as usize == self.frames.len() {
            AllocSide::Top
        } else {
            AllocSide::Bottom
        }
    }

    fn index_of(&self, scope: ScopeId) -> Result<usize, ScratchError> {
        check_scope(
            |i| self.frames.get(i).map(|f| f.serial),
            self.open_depth(),
            scope,
        )
    }

    /// Place a block just below `limit`, returning its data offset.
    fn place_top(&self, limit: usize, req: &Request) -> Result<usize, ScratchError> {
        match limit.checked_sub(req.aligned_size) {
            Some(raw) => {
                let data = align_down(raw, req.align);
                if data >= HEADER_SIZE && data - HEADER_SIZE >= self.bottom {
                    Ok(data)
                } else {
                    Err(self.out_of_memory(req.size))
                }
            }
            None => Err(self.out_of_memory(req.size)),
        }
    }

    fn bump_top(&mut self, index: usize, req: &Request) -> Result<usize, ScratchError> {
        let capacity = self.buffer.capacity();
        let limit = capacity - self.frames[index].end_cursor;
        let data = self.place_top(limit, req)?;

        self.buffer.write_header(data, req.size);
        let frame = &mut self.frames[index];
        frame.end_cursor = capacity - (data - HEADER_SIZE);
        frame.last = Some(LastAlloc {
            side: AllocSide::Top,
            offset: data,
            limit,
        });
        Ok(data)
    }

    fn bump_bottom(&mut self, index: usize, req: &Request) -> Result<usize, ScratchError> {
        let ceiling = self.buffer.capacity() - self.top_end();
        let data = align_up(self.bottom + HEADER_SIZE, req.align);
        let new_bottom = match data.checked_add(req.aligned_size) {
            Some(end) if end <= ceiling => end,
            _ => return Err(self.out_of_memory(req.size)),
        };

        self.buffer.write_header(data, req.size);
        self.bottom = new_bottom;
        let frame = &mut self.frames[index];
        frame.start_cursor = new_bottom;
        frame.last = Some(LastAlloc {
            side: AllocSide::Bottom,
            offset: data,
            limit: 0,
        });
        Ok(data)
    }

    /// Resize the frame's most recent block without bumping a fresh one.
    ///
    /// Returns `None` when `offset` is not that block, or the block is no
    /// longer at the edge its frame grows from.
    fn resize_last(&mut self, index: usize, offset: usize, req: &Request) -> Option<Result<usize, ScratchError>> {
        let capacity = self.buffer.capacity();
        let side = self.side_for(index);
        let frame = &self.frames[index];
        let last = frame.last?;
        if last.offset != offset || last.side != side || offset % req.align != 0 {
            return None;
        }

        match side {
            AllocSide::Top => {
                if frame.end_cursor != capacity - (offset - HEADER_SIZE) {
                    return None;
                }
                if offset + req.aligned_size <= last.limit {
                    self.buffer.write_header(offset, req.size);
                    return Some(Ok(offset));
                }

                // Grow downwards inside the frame's own region.
                let data = match self.place_top(last.limit, req) {
                    Ok(data) => data,
                    Err(err) => return Some(Err(err)),
                };
                let old_size = self.buffer.read_header(offset);
                self.buffer.copy_within(offset, data, old_size.min(req.size));
                self.buffer.write_header(data, req.size);

                let frame = &mut self.frames[index];
                frame.end_cursor = capacity - (data - HEADER_SIZE);
                frame.last = Some(LastAlloc { offset: data, ..last });
                Some(Ok(data))
            }
            AllocSide::Bottom => {
                if frame.start_cursor != self.bottom {
                    return None;
                }
                let ceiling = capacity - self.top_end();
                let new_bottom = match offset.checked_add(req.aligned_size) {
                    Some(end) if end <= ceiling => end,
                    _ => return Some(Err(self.out_of_memory(req.size))),
                };

                self.buffer.write_header(offset, req.size);
                self.bottom = new_bottom;
                self.frames[index].start_cursor = new_bottom;
                Some(Ok(offset))
            }
            AllocSide::Heap => None,
        }
    }

    fn bump(&mut self, index: usize, side: AllocSide, req: &Request) -> Result<usize, ScratchError> {
        match side {
            AllocSide::Top => self.bump_top(index, req),
            _ => self.bump_bottom(index, req),
        }
    }

    /// Fill the bytes a pop just gave back on either end.
    #[cfg(feature = "debug")]
    fn poison_reclaimed(&mut self, closed: &BumpFrame, old_bottom: usize) {
        let capacity = self.buffer.capacity();
        let top_from = capacity - closed.end_cursor;
        let top_to = capacity - self.top_end();
        let bottom = self.bottom;
        crate::debug::poison::poison_freed(self.buffer.reclaimed_bytes(bottom, old_bottom));
        crate::debug::poison::poison_freed(self.buffer.reclaimed_bytes(top_from, top_to));
    }

    #[cfg(not(feature = "debug"))]
    #[inline(always)]
    fn poison_reclaimed(&mut self, _closed: &BumpFrame, _old_bottom: usize) {}

    #[cfg(test)]
    fn frame_cursors(&self, depth: u32) -> Option<(usize, usize)> {
        let frame = self.frames.get((depth as usize).checked_sub(1)?)?;
        Some((frame.start_cursor, frame.end_cursor))
    }

    #[cfg(test)]
    fn offset_of(&self, ptr: NonNull<u8>) -> usize {
        self.buffer.offset_of(ptr).unwrap()
    }
}

impl ScratchStrategy for BumpArena {
    fn push(&mut self, serial: u64, site: Option<CallSite>) -> u32 {
        let depth = self.frames.len() as u32 + 1;
        let end_cursor = self.top_end();
        self.frames.push(BumpFrame {
            serial,
            depth,
            start_cursor: self.bottom,
            end_cursor,
            last: None,
            site,
        });
        depth
    }

    fn pop(&mut self, scope: ScopeId) -> Result<(), ScratchError> {
        check_top(self.frames.last().map(|f| f.serial), self.open_depth(), scope)?;

        let old_bottom = self.bottom;
        let closed = self.frames.pop();
        self.bottom = self.frames.iter().map(|f| f.start_cursor).max().unwrap_or(0);
        if let Some(closed) = closed {
            self.poison_reclaimed(&closed, old_bottom);
        }
        Ok(())
    }

    fn alloc(&mut self, scope: ScopeId, size: usize, align: usize) -> Result<Grant, ScratchError> {
        let req = Request::new(size, align)?;
        let index = self.index_of(scope)?;
        let side = self.side_for(index);
        if req.is_zero_sized() {
            return Ok(Grant {
                ptr: req.dangling(),
                side,
            });
        }

        let data = self.bump(index, side, &req)?;
        self.record_usage();
        Ok(Grant {
            ptr: self.buffer.ptr_at(data),
            side,
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
        let side = self.side_for(index);
        if req.is_zero_sized() {
            return Ok(Grant {
                ptr: req.dangling(),
                side,
            });
        }

        // Zero-sized blocks live outside the buffer: nothing to carry over.
        let old_offset = match self.buffer.offset_of(ptr) {
            Some(offset) if offset >= HEADER_SIZE => offset,
            _ => return self.alloc(scope, size, align),
        };

        if let Some(resized) = self.resize_last(index, old_offset, &req) {
            let data = resized?;
            self.record_usage();
            return Ok(Grant {
                ptr: self.buffer.ptr_at(data),
                side,
            });
        }

        let old_size = self
            .buffer
            .read_header(old_offset)
            .min(self.buffer.capacity() - old_offset);
        let data = self.bump(index, side, &req)?;
        self.buffer.copy_within(old_offset, data, old_size.min(size));
        self.record_usage();
        Ok(Grant {
            ptr: self.buffer.ptr_at(data),
            side,
        })
    }

    fn reset(&mut self) {
        debug_assert!(self.frames.is_empty(), "reset with open scratch frames");
        if self.frames.is_empty() {
            self.bottom = 0;
            self.frame_peak = 0;
        }
    }

    fn open_depth(&self) -> u32 {
        self.frames.len() as u32
    }

    fn scope_site(&self, depth: u32) -> Option<CallSite> {
        self.frames.get((depth as usize).checked_sub(1)?)?.site
    }

    fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn usage(&self) -> usize {
        self.used()
    }

    fn peak(&self) -> usize {
        self.peak
    }

    fn frame_peak(&self) -> usize {
        self.frame_peak
    }
}
