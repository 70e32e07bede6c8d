//! # framescratch
//!
//! Scoped, per-thread frame-temporary scratch memory for real-time frame loops.
//!
//! ## Features
//!
//! - Per-thread arenas, created lazily on first use
//! - Push/pop scopes with bump-pointer allocation
//! - Dual-direction bumping, so a scope resumed underneath newer scopes
//!   (fiber/job schedulers) never overwrites their memory
//! - Heap-tracked mode routing every allocation through the system heap,
//!   for external memory checkers
//! - Per-frame tick: reset, idle eviction, open-scope warnings and leak
//!   detection
//! - Front/back allocation trace views
//! - Coded diagnostics (`FS0xx`) routed to a pluggable sink and to `log`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framescratch::{ScratchAlloc, ScratchConfig};
//! use std::time::Duration;
//!
//! let alloc = ScratchAlloc::new(ScratchConfig::default());
//!
//! // Game loop
//! loop {
//!     let scope = alloc.push();
//!     let temp = scope.alloc_slice_fill(256, 0.0f32);
//!     // ... use temp ...
//!     scope.pop();
//!
//!     alloc.tick(Duration::from_millis(16));
//! #   break;
//! }
//! ```
//!
//! ## Cargo features
//!
//! - `parking_lot`: faster mutexes
//! - `debug`: poison reclaimed memory, capture call stacks in trace views
//! - `tracy`: plot arena usage in the Tracy profiler
//! - `diagnostics`: print warnings to stderr in release builds too

pub mod api;
pub mod diagnostics;
pub mod error;

mod allocators;
mod core;
mod sync;
mod util;

#[cfg(feature = "debug")]
mod debug;

// Re-export public API at crate root for convenience
pub use api::alloc::ScratchAlloc;
pub use api::config::{ArenaMode, ScratchConfig};
pub use api::scope::ScratchScope;
pub use api::stats::{ArenaStats, ScratchStats, TickReport};
pub use error::ScratchError;

// Diagnostics
pub use diagnostics::{CallSite, CollectingSink, DiagContext, DiagnosticSink, Report, StderrSink};
pub use diagnostics::{Diagnostic, DiagnosticKind, StrictMode};
pub use diagnostics::{FS001, FS002, FS003, FS004, FS005, FS006};
pub use diagnostics::{AllocSide, TraceEvent, TraceView};
