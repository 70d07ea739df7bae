//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// specflow - spec-driven workflow engine
#[derive(Parser)]
#[command(
    name = "sf",
    about = "Drive an agent from specification to plan, tasks and implementation",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/specflow/logs/specflow.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start a workflow run in DIR
    Run {
        /// Working directory holding the seed documents
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Target technology stack
        #[arg(short, long, default_value = "Python 3.10+ with FastAPI")]
        stack: String,

        /// Leave the run suspended at the approval gate instead of prompting
        #[arg(short, long)]
        detach: bool,
    },

    /// Approve the pending task list of a suspended run
    Approve {
        /// Run id printed when the run suspended
        run_id: String,

        #[arg(default_value = ".")]
        dir: PathBuf,

        #[arg(short, long)]
        rationale: Option<String>,
    },

    /// Reject the pending task list of a suspended run
    Reject {
        run_id: String,

        #[arg(default_value = ".")]
        dir: PathBuf,

        #[arg(short, long)]
        rationale: Option<String>,
    },

    /// List runs, or show one run's phase and history
    Status {
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Show this run only
        run_id: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate the seed documents and a run's artifacts without generating
    Validate {
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Run whose artifacts to check; the newest run when omitted
        run_id: Option<String>,
    },
}

/// Output format for the status command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Where the binary writes its log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("specflow")
        .join("logs")
        .join("specflow.log")
}
