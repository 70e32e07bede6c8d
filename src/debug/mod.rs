//! Debug utilities for scratch arenas.
//!
//! Only compiled when the `debug` feature is enabled.

pub(crate) mod backtrace;
pub(crate) mod poison;
