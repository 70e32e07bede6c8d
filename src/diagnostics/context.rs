//! Diagnostic context - thread, frame and call-site awareness.
//!
//! Provides context for more intelligent diagnostic messages.

use std::panic::Location;
use std::thread::ThreadId;

/// Source location of a `push` call.
pub type CallSite = &'static Location<'static>;

/// Diagnostic context containing runtime state.
#[derive(Debug, Clone)]
pub struct DiagContext {
    /// Frame number of the allocator that raised the diagnostic.
    pub frame_number: u64,
    /// Thread that owns the arena involved.
    pub thread_id: ThreadId,
    /// Thread name (if available).
    pub thread_name: Option<String>,
    /// Call site of the scope involved, if one was recorded.
    pub site: Option<CallSite>,
    /// Logical depth of the scope involved.
    pub depth: Option<u32>,
}

impl DiagContext {
    /// Capture the context of the calling thread.
    pub fn capture(frame_number: u64) -> Self {
        let thread = std::thread::current();
        Self {
            frame_number,
            thread_id: thread.id(),
            thread_name: thread.name().map(String::from),
            site: None,
            depth: None,
        }
    }

    /// Context for an arena owned by some other thread.
    pub fn for_thread(frame_number: u64, thread_id: ThreadId, thread_name: Option<String>) -> Self {
        Self {
            frame_number,
            thread_id,
            thread_name,
            site: None,
            depth: None,
        }
    }

    /// Attach the scope's call site and depth.
    pub fn with_scope(mut self, site: Option<CallSite>, depth: u32) -> Self {
        self.site = site;
        self.depth = Some(depth);
        self
    }

    /// Format context for diagnostic output.
    pub fn format(&self) -> String {
        let mut parts = Vec::new();

        parts.push(format!("frame={}", self.frame_number));

        if let Some(ref name) = self.thread_name {
            parts.push(format!("thread=\"{}\"", name));
        } else {
            parts.push(format!("thread={:?}", self.thread_id));
        }

        if let Some(depth) = self.depth {
            parts.push(format!("depth={}", depth));
        }

        match self.site {
            Some(site) => parts.push(format!("pushed at {}:{}", site.file(), site.line())),
            None => parts.push("pushed at <unknown>".to_string()),
        }

        parts.join(", ")
    }
}

impl std::fmt::Display for DiagContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}
