//! Diagnostics: source locations, severities, and the collected diagnostic bag.
//!
//! Formatted as `file:line:col: severity: message`, same shape as gcc/clang.

use std::fmt;
use std::path::PathBuf;

/// A position in a source file, assigned by the lexer and threaded through
/// every later stage via `Token`/`Span`/AST nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLoc {
    pub file: FileId,
    pub line: u32,
    pub col: u32,
    pub offset: u32,
}

impl SourceLoc {
    pub fn dummy() -> Self {
        SourceLoc { file: FileId(0), line: 0, col: 0, offset: 0 }
    }
}

/// Interned source file identifier. A single translation unit usually has
/// one `FileId`, but `#line` directives or multi-file drivers may introduce
/// more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

#[derive(Debug, Default, Clone)]
pub struct FileTable {
    names: Vec<PathBuf>,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable { names: Vec::new() }
    }

    pub fn intern(&mut self, path: impl Into<PathBuf>) -> FileId {
        let path = path.into();
        if let Some(pos) = self.names.iter().position(|p| *p == path) {
            return FileId(pos as u32);
        }
        self.names.push(path);
        FileId((self.names.len() - 1) as u32)
    }

    pub fn name(&self, id: FileId) -> &str {
        self.names
            .get(id.0 as usize)
            .and_then(|p| p.to_str())
            .unwrap_or("<unknown>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    /// Invariant breach inside the compiler itself. Always fatal, exit code
    /// 2, never produced by user input alone.
    Internal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Internal => write!(f, "internal compiler error"),
        }
    }
}

/// A single diagnostic, ready to be formatted for display.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: SourceLoc,
    pub message: String,
    /// Which lint/category this belongs to, for `-Wno-*` suppression.
    pub kind: Option<&'static str>,
}

impl Diagnostic {
    pub fn error(loc: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, loc, message: message.into(), kind: None }
    }

    pub fn warning(loc: SourceLoc, kind: &'static str, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, loc, message: message.into(), kind: Some(kind) }
    }

    pub fn note(loc: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Note, loc, message: message.into(), kind: None }
    }

    pub fn internal(loc: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Internal, loc, message: message.into(), kind: None }
    }

    /// Render as `file:line:col: severity: message`.
    pub fn format(&self, files: &FileTable) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            files.name(self.loc.file),
            self.loc.line,
            self.loc.col,
            self.severity,
            self.message
        )
    }
}

/// Collects diagnostics across a whole translation unit so every stage can
/// keep reporting after the first error: lex/syntax/semantic errors do not
/// abort their own stage early, but do block handoff to the next one.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    suppressed: Vec<&'static str>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn suppress(&mut self, kind: &'static str) {
        self.suppressed.push(kind);
    }

    pub fn push(&mut self, diag: Diagnostic) {
        if let (Severity::Warning, Some(kind)) = (diag.severity, diag.kind) {
            if self.suppressed.contains(&kind) {
                return;
            }
        }
        self.diagnostics.push(diag);
    }

    pub fn error(&mut self, loc: SourceLoc, message: impl Into<String>) {
        self.push(Diagnostic::error(loc, message));
    }

    pub fn warning(&mut self, loc: SourceLoc, kind: &'static str, message: impl Into<String>) {
        self.push(Diagnostic::warning(loc, kind, message));
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.severity, Severity::Error | Severity::Internal))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn print_all(&self, files: &FileTable) {
        for diag in &self.diagnostics {
            eprintln!("{}", diag.format(files));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_per_spec() {
        let mut files = FileTable::new();
        let file = files.intern("test.c");
        let diag = Diagnostic::error(
            SourceLoc { file, line: 3, col: 5, offset: 0 },
            "undeclared identifier 'x'",
        );
        assert_eq!(
            diag.format(&files),
            "test.c:3:5: error: undeclared identifier 'x'"
        );
    }

    #[test]
    fn warnings_are_suppressible() {
        let mut bag = DiagnosticBag::new();
        bag.suppress("unused-variable");
        bag.warning(SourceLoc::dummy(), "unused-variable", "unused variable 'y'");
        assert!(bag.is_empty());
        assert!(!bag.has_errors());
    }

    #[test]
    fn errors_are_tracked() {
        let mut bag = DiagnosticBag::new();
        bag.error(SourceLoc::dummy(), "boom");
        assert!(bag.has_errors());
        assert_eq!(bag.len(), 1);
    }
}
