//! Diagnostics collected by the passes.
//!
//! The lexical/syntactic/semantic/codegen error taxonomy (spec.md §7) is
//! data, not a Rust-level error: a `Diagnostic` is a value pushed onto a
//! per-phase [`DiagnosticSink`], never a `Result::Err`. Only driver-level
//! failures (bad CLI usage, unreadable file, I/O failure writing an
//! output) are real `Result`s — see `driver.rs`'s `DriverError`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One diagnostic: `Line N: <message>`, warnings additionally prefixed
/// `Warning: ` per spec.md §7.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn error(line: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            line,
            message: message.into(),
        }
    }

    pub fn warning(line: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Error => write!(f, "Line {}: {}", self.line, self.message),
            Severity::Warning => write!(f, "Line {}: Warning: {}", self.line, self.message),
        }
    }
}

/// Write-only, append-in-tree-walk-order sink for one pass's diagnostics.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
    has_error: bool,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.has_error = true;
        }
        tracing::debug!(line = diag.line, message = %diag.message, warning = diag.severity == Severity::Warning, "diagnostic");
        self.entries.push(diag);
    }

    pub fn error(&mut self, line: usize, message: impl Into<String>) {
        self.push(Diagnostic::error(line, message));
    }

    pub fn warning(&mut self, line: usize, message: impl Into<String>) {
        self.push(Diagnostic::warning(line, message));
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn extend(&mut self, other: &DiagnosticSink) {
        self.has_error |= other.has_error;
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Render every entry as one `Diagnostic::Display` line per line,
    /// the format every `.out*errors` file shares.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.entries {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_is_labeled() {
        let mut sink = DiagnosticSink::new();
        sink.warning(3, "overloaded function 'f'");
        assert_eq!(sink.render(), "Line 3: Warning: overloaded function 'f'\n");
        assert!(!sink.has_error());
    }

    #[test]
    fn error_sets_has_error() {
        let mut sink = DiagnosticSink::new();
        sink.error(1, "undefined identifier 'x'");
        assert!(sink.has_error());
        assert_eq!(sink.render(), "Line 1: undefined identifier 'x'\n");
    }

    #[test]
    fn extend_merges_and_preserves_order() {
        let mut a = DiagnosticSink::new();
        a.error(1, "first");
        let mut b = DiagnosticSink::new();
        b.warning(2, "second");
        a.extend(&b);
        assert_eq!(a.entries().len(), 2);
        assert!(a.has_error());
    }
}
