//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong.
    Warning,
    /// Additional context about another diagnostic.
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `FS00x` - Scratch arena capacity and scope discipline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "FS001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// Predefined diagnostics (FS00x)
// =============================================================================

/// FS001: Scratch arena exhausted.
pub const FS001: Diagnostic = Diagnostic::error(
    "FS001",
    "scratch arena exhausted"
).with_note("the bottom and top bump cursors would cross")
 .with_help("raise arena_capacity in ScratchConfig, or pop scopes sooner");

/// FS002: Scope still open across a frame boundary.
pub const FS002: Diagnostic = Diagnostic::warning(
    "FS002",
    "scratch scope is still open across a frame boundary"
).with_note("a push() has not been matched by pop() by the time the frame ended")
 .with_help("scratch memory must not be held across frames; pop the scope before the frame ends");

/// FS003: Scope never popped.
pub const FS003: Diagnostic = Diagnostic::error(
    "FS003",
    "scratch scope pushed but never popped"
).with_note("the scope stayed open longer than the leak grace period")
 .with_help("make sure every push() has a matching pop() on every code path");

/// FS004: Pop without a matching push.
pub const FS004: Diagnostic = Diagnostic::error(
    "FS004",
    "scratch scope popped without a matching push"
).with_note("scopes on one arena must close in reverse order of opening")
 .with_help("pop the innermost scope first");

/// FS005: Arena released with open scopes.
pub const FS005: Diagnostic = Diagnostic::error(
    "FS005",
    "scratch arena released while scopes are still open"
).with_note("arenas may only be released once every scope has been popped");

/// FS006: System heap refused a heap-tracked allocation.
pub const FS006: Diagnostic = Diagnostic::error(
    "FS006",
    "system heap refused a heap-tracked scratch allocation"
).with_note("heap-tracked mode routes every scratch allocation through the global allocator");
