//! Per-stage error types, unified by [`CompileError`]. Each variant gets a
//! hand-written `Display`/`Error` impl rather than a `thiserror` derive.

use std::fmt;

/// Lexing produced at least one diagnostic: no IR is produced if any lex
/// error occurred. Individual diagnostics are already formatted and
/// printed via `DiagnosticBag`; this carries just the count so the driver
/// can classify the failure.
#[derive(Debug, Clone, Copy)]
pub struct LexError {
    pub error_count: u32,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lexing failed with {} error(s)", self.error_count)
    }
}

impl std::error::Error for LexError {}

/// Parser recovery exhausted the translation unit with at least one syntax
/// error: no IR is produced in that case.
#[derive(Debug, Clone, Copy)]
pub struct ParseError {
    pub error_count: u32,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parsing failed with {} error(s)", self.error_count)
    }
}

impl std::error::Error for ParseError {}

/// A semantic error: type mismatch, undeclared name, failed
/// `_Static_assert`, non-constant where a constant is required. The IR
/// builder never sees a function whose body raised one of these.
#[derive(Debug, Clone, Copy)]
pub struct SemaError {
    pub error_count: u32,
}

impl fmt::Display for SemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "semantic analysis failed with {} error(s)", self.error_count)
    }
}

impl std::error::Error for SemaError {}

/// Back-end internal error: an invariant breach reaching this deep is a
/// compiler bug, not a user error, and is always fatal.
#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error in code generation: a malformed IR invariant, a
    /// register allocator that ran out of registers and slots, an
    /// unsupported construct that reached the back end.
    Logic(String),
    /// A formatting error encountered while writing assembly text.
    Format(std::fmt::Error),
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{s}"),
            CodeGenError::Format(e) => write!(f, "code generation error: {e}"),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

/// Top-level error a `driver` call can fail with. `diag.rs`'s
/// `DiagnosticBag` already carries every lex/syntax/semantic diagnostic
/// accumulated along the way; `CompileError` surfaces the terminal
/// condition that stopped the pipeline: there is no partial-success mode.
#[derive(Debug)]
pub enum CompileError {
    /// At least one diagnostic of severity error was recorded; exit code 1.
    UserErrors(u32),
    /// An internal compiler error; exit code 2.
    Internal(CodeGenError),
    /// Reading or writing a file failed.
    Io(std::io::Error),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UserErrors(n) => write!(f, "{n} error(s)"),
            CompileError::Internal(e) => write!(f, "internal compiler error: {e}"),
            CompileError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CodeGenError> for CompileError {
    fn from(e: CodeGenError) -> Self {
        CompileError::Internal(e)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

impl CompileError {
    /// The process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::UserErrors(_) => 1,
            CompileError::Internal(_) => 2,
            CompileError::Io(_) => 2,
        }
    }
}
