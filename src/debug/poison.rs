//! Memory poisoning for debugging.
//!
//! Fills reclaimed scratch bytes with a known pattern so reads through stale
//! pointers show up as `0xCD` garbage instead of plausible old data.

/// Pattern written over bytes reclaimed by a pop or reset.
pub const FREED_PATTERN: u8 = 0xCD;

/// Pattern written over freshly handed out bytes.
pub const UNINIT_PATTERN: u8 = 0xAB;

/// Poison a byte range with the freed pattern.
pub fn poison_freed(bytes: &mut [u8]) {
    bytes.fill(FREED_PATTERN);
}

/// Poison a byte range with the uninitialized pattern.
pub fn poison_uninit(bytes: &mut [u8]) {
    bytes.fill(UNINIT_PATTERN);
}

/// Returns true if every byte matches the freed pattern.
pub fn is_freed_poison(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == FREED_PATTERN)
}
