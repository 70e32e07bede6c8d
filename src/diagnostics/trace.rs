//! Front/back allocation trace views.
//!
//! The owning thread records into the front view while the previous frame's
//! view sits frozen in the back slot for inspection (debugger overlays and
//! the like). [`TraceViews::swap`] runs once per tick.

use super::context::CallSite;

/// Where in the arena an allocation landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocSide {
    /// Top end of the buffer, growing down (the frame was the newest open frame).
    Top,
    /// Bottom end of the buffer, growing up (a collapsing frame).
    Bottom,
    /// Routed to the system heap (heap-tracked mode).
    Heap,
}

/// One recorded allocation.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Requested size in bytes.
    pub size: usize,
    /// Effective alignment.
    pub align: usize,
    /// Where the bytes came from.
    pub side: AllocSide,
    /// Logical depth of the scope that allocated.
    pub depth: u32,
    /// Call site of the scope's push.
    pub site: Option<CallSite>,
    /// Whether this was a resize of an earlier allocation.
    pub realloc: bool,
    /// Captured call stack (feature `debug`).
    pub callstack: Option<String>,
}

/// One frame's worth of trace data.
#[derive(Debug, Clone, Default)]
pub struct TraceView {
    events: Vec<TraceEvent>,
    peak: usize,
    frame_peak: usize,
    frame_number: u64,
    frozen: bool,
}

impl TraceView {
    /// Recorded allocations, oldest first.
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Lifetime peak usage carried across swaps.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Peak usage within this view's frame.
    pub fn frame_peak(&self) -> usize {
        self.frame_peak
    }

    /// Frame number this view was frozen at (0 while still recording).
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Whether this is a frozen back view.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Sum of requested bytes over all recorded events.
    pub fn total_requested(&self) -> usize {
        self.events.iter().map(|e| e.size).sum()
    }

    fn clear(&mut self) {
        self.events.clear();
        self.frame_peak = 0;
        self.frame_number = 0;
        self.frozen = false;
    }
}

/// The front/back pair owned by one arena.
#[derive(Debug, Default)]
pub(crate) struct TraceViews {
    front: TraceView,
    back: TraceView,
}

impl TraceViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an allocation into the front view.
    pub fn record(&mut self, mut event: TraceEvent, usage: usize) {
        #[cfg(feature = "debug")]
        {
            event.callstack = Some(crate::debug::backtrace::capture_callstack());
        }
        #[cfg(not(feature = "debug"))]
        {
            event.callstack = None;
        }
        self.front.events.push(event);
        self.front.frame_peak = self.front.frame_peak.max(usage);
        self.front.peak = self.front.peak.max(usage);
    }

    /// Freeze the front view and start a fresh one.
    pub fn swap(&mut self, frame_number: u64) {
        std::mem::swap(&mut self.front, &mut self.back);
        self.back.frozen = true;
        self.back.frame_number = frame_number;

        self.front.clear();
        self.front.peak = self.front.peak.max(self.back.peak);
    }

    #[cfg(test)]
    fn front(&self) -> &TraceView {
        &self.front
    }

    pub fn back(&self) -> &TraceView {
        &self.back
    }
}
