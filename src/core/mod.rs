//! Arena lifecycle: per-thread arenas, the registry and the thread-local cache.

pub(crate) mod arena;
pub(crate) mod registry;
pub(crate) mod tls;
