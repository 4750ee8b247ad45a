//! pcc CLI
//!
//! Command-line interface for compiling a single preprocessed C translation
//! unit to assembly or to a relocatable object.

use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use pcc::config::{CompilerConfig, Define, OptimizationLevel, OutputKind};
use pcc::driver;

#[derive(ClapParser)]
#[command(name = "pcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "pcc - a compiler for a practical subset of C", long_about = None)]
struct Cli {
    /// Input source file. Assumed already preprocessed unless `-E` input
    /// forwarding is handled upstream; the preprocessor is an external
    /// collaborator, not part of this crate.
    input: PathBuf,

    /// Output path (defaults to the input stem with `.s` or `.o`).
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Emit textual assembly instead of a relocatable object.
    #[arg(short = 'S')]
    assembly: bool,

    /// Disable the optimizer pipeline (default).
    #[arg(short = 'O', value_name = "LEVEL", default_value_t = 0)]
    opt_level: u8,

    /// Add a directory to the include search path (forwarded to an external
    /// preprocessor only; `pcc` itself never searches headers).
    #[arg(short = 'I', value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Define `NAME` or `NAME=VALUE` (forwarded to an external preprocessor).
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    defines: Vec<String>,

    /// Undefine `NAME` (forwarded to an external preprocessor).
    #[arg(short = 'U', value_name = "NAME")]
    undefines: Vec<String>,

    /// Disable a named warning category, e.g. `-Wno-unused-variable`.
    #[arg(long = "Wno", value_name = "KIND")]
    disabled_warnings: Vec<String>,

    /// Trace pipeline stage progress to stderr.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Print shell completion script for `shell` and exit.
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
            .with_target(false)
            .init();
    }

    let config = build_config(&cli);
    let output = cli.output.clone().unwrap_or_else(|| default_output_path(&cli.input, &config));

    if let Err(err) = driver::compile_file(&cli.input, &output, &config) {
        eprintln!("pcc: {err}");
        process::exit(err.exit_code());
    }
}

fn build_config(cli: &Cli) -> CompilerConfig {
    let mut config = CompilerConfig::new()
        .with_opt_level(if cli.opt_level == 0 { OptimizationLevel::O0 } else { OptimizationLevel::O1 })
        .with_output_kind(if cli.assembly { OutputKind::Assembly } else { OutputKind::Object });

    for dir in &cli.include_dirs {
        config = config.with_include_dir(dir.clone());
    }
    for kind in &cli.disabled_warnings {
        config = config.with_disabled_warning(kind.clone());
    }
    for spec in &cli.defines {
        config.defines.push(parse_define(spec));
    }
    for name in &cli.undefines {
        config = config.with_undefine(name.clone());
    }
    config.verbose = cli.verbose;
    config
}

fn parse_define(spec: &str) -> Define {
    match spec.split_once('=') {
        Some((name, value)) => Define::Set { name: name.to_string(), value: Some(value.to_string()) },
        None => Define::Set { name: spec.to_string(), value: None },
    }
}

fn default_output_path(input: &std::path::Path, config: &CompilerConfig) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let ext = match config.output_kind {
        OutputKind::Assembly => "s",
        OutputKind::Object => "o",
    };
    PathBuf::from(stem).with_extension(ext)
}
