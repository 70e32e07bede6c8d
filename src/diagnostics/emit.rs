//! Diagnostic emission backend.
//!
//! Handles outputting diagnostics to stderr, the `log` facade, or custom sinks.

use std::io::Write;
use std::sync::Arc;

use super::context::DiagContext;
use super::kind::{Diagnostic, DiagnosticKind};
use super::strict::StrictMode;
use crate::sync::mutex::Mutex;

/// A diagnostic together with the runtime context it was raised in.
#[derive(Debug, Clone)]
pub struct Report {
    /// The coded diagnostic.
    pub diagnostic: Diagnostic,
    /// Formatted [`DiagContext`].
    pub context: String,
}

impl Report {
    /// Build a report from a diagnostic and its context.
    pub fn new(diagnostic: &Diagnostic, context: &DiagContext) -> Self {
        Self {
            diagnostic: diagnostic.clone(),
            context: context.format(),
        }
    }

    /// Shorthand for the diagnostic's code.
    pub fn code(&self) -> &'static str {
        self.diagnostic.code
    }

    /// Shorthand for the diagnostic's kind.
    pub fn kind(&self) -> DiagnosticKind {
        self.diagnostic.kind
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let diag = &self.diagnostic;
        writeln!(
            f,
            "[framescratch][{}] {}: {}",
            diag.code,
            diag.kind.prefix(),
            diag.message
        )?;
        writeln!(f, "  context: {}", self.context)?;
        if let Some(note) = diag.note {
            writeln!(f, "  note: {}", note)?;
        }
        if let Some(help) = diag.help {
            writeln!(f, "  help: {}", help)?;
        }
        Ok(())
    }
}

/// A diagnostic sink trait for custom output.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a report.
    fn emit(&self, report: &Report);
}

/// Default sink: rustc-style lines on stderr.
///
/// Warnings are only printed in debug builds or with the `diagnostics`
/// feature; errors are always printed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&self, report: &Report) {
        let verbose = cfg!(any(debug_assertions, feature = "diagnostics"));
        if report.kind() != DiagnosticKind::Error && !verbose {
            return;
        }
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "{}", report);
    }
}

/// A simple sink that collects reports.
#[derive(Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<Report>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected reports.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Codes of all collected reports, in emission order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.reports.lock().iter().map(Report::code).collect()
    }

    /// Clear collected reports.
    pub fn clear(&self) {
        self.reports.lock().clear();
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        self.reports
            .lock()
            .iter()
            .any(|r| r.kind() == DiagnosticKind::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, report: &Report) {
        self.reports.lock().push(report.clone());
    }
}

/// Mirror a report to the `log` facade.
pub fn emit_to_log(report: &Report) {
    let diag = &report.diagnostic;
    match diag.kind {
        DiagnosticKind::Error => {
            log::error!("[{}] {} ({})", diag.code, diag.message, report.context);
        }
        DiagnosticKind::Warning => {
            log::warn!("[{}] {} ({})", diag.code, diag.message, report.context);
        }
        DiagnosticKind::Note => {
            log::info!("[{}] {} ({})", diag.code, diag.message, report.context);
        }
    }
}

/// Routes reports to the configured sink and applies strict mode.
#[derive(Clone)]
pub(crate) struct Emitter {
    sink: Arc<dyn DiagnosticSink>,
    strict: StrictMode,
}

impl Emitter {
    pub fn new(sink: Arc<dyn DiagnosticSink>, strict: StrictMode) -> Self {
        Self { sink, strict }
    }

    /// Emit a diagnostic. Panics afterwards if strict mode escalates it.
    ///
    /// Must not be called while an arena or registry lock is held.
    pub fn emit(&self, diag: &Diagnostic, context: &DiagContext) {
        let report = self.notify(diag, context);

        if self.strict.should_panic(diag.kind) && !std::thread::panicking() {
            panic!(
                "[framescratch][{}] {}\nContext: {}\nStrict mode enabled - {}s are fatal.",
                diag.code,
                diag.message,
                report.context,
                diag.kind.prefix()
            );
        }
    }

    /// Emit a diagnostic without ever escalating. Used from thread-exit
    /// destructors, where a panic would abort the process.
    pub fn notify(&self, diag: &Diagnostic, context: &DiagContext) -> Report {
        let report = Report::new(diag, context);
        emit_to_log(&report);
        self.sink.emit(&report);
        report
    }

    /// Emit a diagnostic and abort the current operation.
    pub fn fatal(&self, diag: &Diagnostic, context: &DiagContext, detail: &dyn std::fmt::Display) -> ! {
        self.emit(diag, context);
        panic!(
            "[framescratch][{}] {}: {}\nContext: {}",
            diag.code,
            diag.message,
            detail,
            context.format()
        );
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter").field("strict", &self.strict).finish()
    }
}
