//! Size helper functions.

use std::sync::OnceLock;

/// Convert kilobytes to bytes.
#[inline]
pub const fn kb(n: usize) -> usize {
    n * 1024
}

/// Convert megabytes to bytes.
#[inline]
pub const fn mb(n: usize) -> usize {
    n * 1024 * 1024
}

/// Format bytes as a human-readable string.
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// The platform page size, queried once.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 && (size as usize).is_power_of_two() {
        size as usize
    } else {
        4096
    }
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    4096
}

/// Round a capacity up to a whole number of pages (at least one page).
pub fn round_to_pages(bytes: usize) -> usize {
    let page = page_size();
    let pages = bytes.div_ceil(page).max(1);
    pages * page
}
