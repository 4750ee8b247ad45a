//! Compiler configuration.
//!
//! Mirrors a builder shape common for CLI-driven compilers (external
//! builtins, library paths), adapted to the flags a C compiler needs:
//! optimization level, output kind, and preprocessor forwarding.

use std::path::PathBuf;

/// Whether the optimizer pipeline runs at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationLevel {
    /// `-O0`: optimizer pipeline disabled entirely.
    #[default]
    O0,
    /// `-O1`: the fixed optimizer pass pipeline runs once.
    O1,
}

/// What the back end should produce; `-S` selects `Assembly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// Textual Intel-syntax assembly.
    Assembly,
    /// Relocatable object file (COFF on Windows, ELF elsewhere).
    #[default]
    Object,
}

/// A `-D NAME[=VALUE]` / `-U NAME` forwarded to the external preprocessor.
#[derive(Debug, Clone)]
pub enum Define {
    Set { name: String, value: Option<String> },
    Unset { name: String },
}

/// Configuration for a single compilation, built up from CLI flags in
/// `main.rs` or constructed directly by library callers.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub opt_level: OptimizationLevel,
    pub output_kind: OutputKind,
    /// `-I` search directories, forwarded to the external preprocessor.
    pub include_dirs: Vec<PathBuf>,
    /// `-D`/`-U`, forwarded to the external preprocessor.
    pub defines: Vec<Define>,
    /// `-E`: stop after preprocessing and write the preprocessed text as
    /// the output. The preprocessor itself is an external collaborator.
    pub stop_after_preprocess: bool,
    /// Input is assumed already preprocessed unless this is set, in which
    /// case `pcc` shells out to an external `-E` pass first.
    pub run_preprocessor: bool,
    /// Path to the external preprocessor binary (defaults to `cc -E`-like
    /// invocation); only consulted when `run_preprocessor` is set.
    pub preprocessor: Option<PathBuf>,
    /// Warning categories disabled via `-Wno-<kind>`.
    pub disabled_warnings: Vec<String>,
    /// `-v`: trace pipeline stage names to stderr via `tracing`.
    pub verbose: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            opt_level: OptimizationLevel::default(),
            output_kind: OutputKind::default(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
            stop_after_preprocess: false,
            run_preprocessor: false,
            preprocessor: None,
            disabled_warnings: Vec::new(),
            verbose: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_opt_level(mut self, level: OptimizationLevel) -> Self {
        self.opt_level = level;
        self
    }

    pub fn with_output_kind(mut self, kind: OutputKind) -> Self {
        self.output_kind = kind;
        self
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.defines.push(Define::Set { name: name.into(), value });
        self
    }

    pub fn with_undefine(mut self, name: impl Into<String>) -> Self {
        self.defines.push(Define::Unset { name: name.into() });
        self
    }

    pub fn with_disabled_warning(mut self, kind: impl Into<String>) -> Self {
        self.disabled_warnings.push(kind.into());
        self
    }

    pub fn optimizer_enabled(&self) -> bool {
        matches!(self.opt_level, OptimizationLevel::O1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_o0_and_object() {
        let cfg = CompilerConfig::default();
        assert_eq!(cfg.opt_level, OptimizationLevel::O0);
        assert_eq!(cfg.output_kind, OutputKind::Object);
        assert!(!cfg.optimizer_enabled());
    }

    #[test]
    fn builder_chains() {
        let cfg = CompilerConfig::new()
            .with_opt_level(OptimizationLevel::O1)
            .with_output_kind(OutputKind::Assembly)
            .with_include_dir("/usr/include")
            .with_define("NDEBUG", None)
            .with_disabled_warning("unused-variable");

        assert!(cfg.optimizer_enabled());
        assert_eq!(cfg.output_kind, OutputKind::Assembly);
        assert_eq!(cfg.include_dirs, vec![PathBuf::from("/usr/include")]);
        assert_eq!(cfg.disabled_warnings, vec!["unused-variable".to_string()]);
    }
}
