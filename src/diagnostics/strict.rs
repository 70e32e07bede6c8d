//! Strict mode handling for diagnostics.
//!
//! Allows configuration of how non-fatal diagnostics are treated:
//! - Warn: Just emit the diagnostic
//! - Panic: Emit and then panic (useful for CI)

use super::kind::DiagnosticKind;

/// Strict mode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum StrictMode {
    /// Just warn, don't panic.
    #[default]
    Warn = 0,
    /// Panic on errors.
    PanicOnError = 1,
    /// Panic on errors and warnings.
    PanicOnWarning = 2,
}

impl From<u8> for StrictMode {
    fn from(val: u8) -> Self {
        match val {
            1 => StrictMode::PanicOnError,
            2 => StrictMode::PanicOnWarning,
            _ => StrictMode::Warn,
        }
    }
}

impl StrictMode {
    /// Parse the `FRAMESCRATCH_STRICT` spelling:
    /// - "0" or "warn" -> Warn
    /// - "1" or "error" -> PanicOnError
    /// - "2" or "warning" -> PanicOnWarning
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "1" | "error" | "true" => StrictMode::PanicOnError,
            "2" | "warning" | "all" => StrictMode::PanicOnWarning,
            _ => StrictMode::Warn,
        }
    }

    /// Check if a diagnostic of this kind should escalate to a panic.
    pub fn should_panic(self, kind: DiagnosticKind) -> bool {
        match kind {
            DiagnosticKind::Error => {
                matches!(self, StrictMode::PanicOnError | StrictMode::PanicOnWarning)
            }
            DiagnosticKind::Warning => matches!(self, StrictMode::PanicOnWarning),
            DiagnosticKind::Note => false,
        }
    }
}
