//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Swak -- pluggable event pipeline.
///
/// Use `swak <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "swak", version, about, long_about = None)]
pub struct Cli {
    /// Path to a swak.toml configuration file (default: built-in defaults).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Raise verbosity (-v = info, -vv = debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered plugins.
    List(ListArgs),

    /// Describe a plugin and its arguments.
    Desc(DescArgs),

    /// Assemble and validate a pipeline without running it.
    Validate(PipelineArgs),

    /// Run a pipeline until its input is exhausted.
    Test(TestArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- list ----

/// List registered plugins.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show only one name prefix (in, par, tr, buf, out, cmd).
    #[arg(long)]
    pub prefix: Option<String>,
}

// ---- desc ----

/// Describe a plugin.
#[derive(Args, Debug)]
pub struct DescArgs {
    /// Canonical plugin name (e.g. in.counter).
    pub name: String,
}

// ---- validate ----

/// A pipe-delimited pipeline command.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Pipeline command, e.g. "in.counter --fields 3 | out.stdout".
    pub command: String,
}

// ---- test ----

/// Run a pipeline.
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Pipeline command, e.g. "in.counter --fields 3 | out.stdout".
    pub command: String,

    /// Stop after this many seconds even if the input is not exhausted.
    #[arg(long)]
    pub duration: Option<f64>,

    /// Tag attached to input events (overrides [pipeline] tag).
    #[arg(long)]
    pub tag: Option<String>,
}

// ---- config ----

/// Manage swak configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, pipeline, buffer).
        #[arg(long)]
        section: Option<String>,
    },
}
