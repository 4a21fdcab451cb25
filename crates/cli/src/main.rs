use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use veil::commands::{inspect_command, list_schemes_command, obfuscate_command};
use veil::ConfigOverrides;
use veil_core::Scheme;

/// Semantics-preserving obfuscator for C translation units.
///
/// This CLI is a thin wrapper around `veil-core` (exposed in code as `veil_core`).
/// All transformation logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(name = "veil", version, about = "Semantics-preserving C source obfuscator", long_about = None)]
struct Cli {
    /// Log every pipeline stage (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Obfuscate one C source file.
    ///
    /// The result is written to `<stem>_obf.<ext>` next to the input unless
    /// `--output` is given.
    Obfuscate {
        /// Input C file (single translation unit).
        input: PathBuf,

        /// Output file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for every random choice; the same seed reproduces the output.
        #[arg(long)]
        seed: Option<u64>,

        /// Do not rename identifiers.
        #[arg(long, default_value_t = false)]
        no_rename: bool,

        /// Do not encrypt string literals (no decoder is injected).
        #[arg(long, default_value_t = false)]
        no_strings: bool,

        /// Do not rewrite numeric constants.
        #[arg(long, default_value_t = false)]
        no_const: bool,

        /// Do not insert opaque predicates.
        #[arg(long, default_value_t = false)]
        no_opaque: bool,

        /// Do not replace comments.
        #[arg(long, default_value_t = false)]
        no_strip_comments: bool,

        /// How many dead functions to inject.
        #[arg(long)]
        garbage_count: Option<usize>,

        /// Share of rename candidates to rename, in [0, 1].
        #[arg(long)]
        coverage: Option<f64>,

        #[command(flatten)]
        common: CommonArgs,

        /// Emit the report as JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the named schemes.
    Schemes {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show which identifiers would be rename candidates, and how they were found.
    Inspect {
        /// Input C file.
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Options shared by commands that build a pipeline.
#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON or YAML configuration file.
    #[arg(long, conflicts_with = "scheme")]
    config: Option<PathBuf>,

    /// Named preset: easy or diff.
    #[arg(long)]
    scheme: Option<Scheme>,

    /// Path to the clang binary used for structural extraction.
    #[arg(long)]
    clang: Option<PathBuf>,

    /// Semicolon-separated extra clang arguments (e.g. "-Iinc;-DDEBUG").
    #[arg(long, allow_hyphen_values = true)]
    clang_args: Option<String>,
}

impl CommonArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            scheme: self.scheme,
            clang: self.clang.clone(),
            clang_args: self.clang_args.clone(),
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "veil_core=debug,veil=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Obfuscate {
            input,
            output,
            seed,
            no_rename,
            no_strings,
            no_const,
            no_opaque,
            no_strip_comments,
            garbage_count,
            coverage,
            common,
            json,
        } => {
            let overrides = ConfigOverrides {
                seed,
                no_rename,
                no_strings,
                no_const,
                no_opaque,
                no_strip_comments,
                garbage_count,
                coverage,
                ..common.overrides()
            };
            obfuscate_command(&input, output.as_deref(), common.config.as_deref(), &overrides, json)?
        }
        Command::Schemes { json } => list_schemes_command(json)?,
        Command::Inspect { input, common, json } => {
            inspect_command(&input, common.config.as_deref(), &common.overrides(), json)?
        }
    }

    Ok(())
}
