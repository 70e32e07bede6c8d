//! Public API for framescratch.
//!
//! This module contains all user-facing types.
//! Most users should only interact with types from this module.

pub mod alloc;
pub mod config;
pub mod scope;
pub mod stats;
