//! Diagnostics for scratch arenas.
//!
//! This module provides:
//! - **Runtime diagnostics**: coded messages routed to a [`DiagnosticSink`]
//! - **Strict mode**: optional panic-on-warning for CI
//! - **Trace views**: front/back per-arena allocation traces
//! - **Profiler integration**: Tracy plots (feature `tracy`)
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                                  |
//! |-------|------------------------------------------|
//! | FS001 | Arena exhausted                          |
//! | FS002 | Scope open across a frame boundary       |
//! | FS003 | Scope never popped (leak)                |
//! | FS004 | Pop without matching push / out of order |
//! | FS005 | Arena released with open scopes          |
//! | FS006 | System heap refused a tracked allocation |

pub mod context;
pub mod emit;
pub mod kind;
pub mod strict;
pub mod trace;

pub(crate) mod profiler;

pub use context::{CallSite, DiagContext};
pub use emit::{emit_to_log, CollectingSink, DiagnosticSink, Report, StderrSink};
pub use kind::{Diagnostic, DiagnosticKind};
pub use kind::{FS001, FS002, FS003, FS004, FS005, FS006};
pub use strict::StrictMode;
pub use trace::{AllocSide, TraceEvent, TraceView};
