//! CLI parse: clap types for Pulse. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pulse CLI - training session metrics pipeline
#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Real-time training session metrics pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the pipeline over a JSON-lines event file into the store
    Replay {
        /// One inbound event frame per line
        file: PathBuf,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show stored analytics records for a session
    Records {
        #[arg(long)]
        session: String,
        /// Roll records up to session, daily, weekly, monthly or seasonal
        #[arg(long, default_value = "session")]
        level: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the resolved configuration as TOML
    Config,
}
