//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "bottle-sim", version, about = "Smart bottle host simulator")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/bottle_config.toml")]
    pub config: PathBuf,

    /// Override `storage.dir` from the config
    #[arg(long = "state-dir", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Emit events and errors as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to `[logging].level`
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the device through a scripted sequence of wake cycles
    Run {
        /// Scenario TOML with `[[step]]` entries
        #[arg(long, value_name = "FILE")]
        scenario: PathBuf,
    },
    /// Write the persisted drink log as CSV
    Export {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
    },
    /// Validate config, store round-trip and sensor presence
    SelfCheck,
}

