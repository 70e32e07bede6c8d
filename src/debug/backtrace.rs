//! Call stack capture for trace views.

/// Capture the current call stack as text.
pub fn capture_callstack() -> String {
    let bt = ::backtrace::Backtrace::new();
    format!("{:?}", bt)
}
