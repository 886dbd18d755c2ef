//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Semi-automated conformance tests for mobile device Web APIs
#[derive(Parser, Debug)]
#[command(name = "webapi-tests")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the coordination server in the foreground
    Serve(ServeArgs),

    /// Run the conformance cases against a device
    Run(RunArgs),

    /// List the available cases
    List,
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Host to bind
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to bind
    #[arg(short, long, default_value = "6666")]
    pub port: u16,

    /// Allow cross-origin requests
    #[arg(long)]
    pub cors: bool,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML suite configuration
    #[arg(short, long, env = "WEBAPI_TESTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Marionette host
    #[arg(long)]
    pub marionette_host: Option<String>,

    /// Marionette port
    #[arg(long)]
    pub marionette_port: Option<u16>,

    /// Coordination server port (0 picks a free one)
    #[arg(long)]
    pub server_port: Option<u16>,

    /// Only run cases whose name contains this
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Remote signal timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Remote signal poll interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Operator answer deadline in milliseconds
    #[arg(long)]
    pub prompt_timeout_ms: Option<u64>,

    /// Stop after the first failing case
    #[arg(long)]
    pub fail_fast: bool,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Detect from the terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
