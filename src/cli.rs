//! Command-line interface for the supervisor.
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Wrapper around `LevelFilter` so clap can parse log levels from either
/// string names ("info", "debug", etc.) or numeric shorthands (0-5).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        if let Ok(number) = trimmed.parse::<u8>() {
            let level = match number {
                0 => LevelFilter::OFF,
                1 => LevelFilter::ERROR,
                2 => LevelFilter::WARN,
                3 => LevelFilter::INFO,
                4 => LevelFilter::DEBUG,
                5 => LevelFilter::TRACE,
                _ => {
                    return Err(format!(
                        "unsupported log level number '{number}' (expected 0-5)"
                    ));
                }
            };
            return Ok(LogLevelArg(level));
        }

        let lowercase = trimmed.to_ascii_lowercase();
        let level = match lowercase.as_str() {
            "off" => Some(LevelFilter::OFF),
            "error" | "err" => Some(LevelFilter::ERROR),
            "warn" | "warning" => Some(LevelFilter::WARN),
            "info" | "information" => Some(LevelFilter::INFO),
            "debug" => Some(LevelFilter::DEBUG),
            "trace" => Some(LevelFilter::TRACE),
            _ => None,
        }
        .ok_or_else(|| format!("invalid log level '{trimmed}'"))?;

        Ok(LogLevelArg(level))
    }
}

/// Parses a single `KEY=VALUE` pair for repeated `--env` flags.
fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("invalid --env value '{raw}', expected KEY=VALUE")),
    }
}

/// A local process supervisor with PM2-style ergonomics.
#[derive(Parser)]
#[command(name = "warden", version, author)]
#[command(about = "A local process supervisor for long-running scripts", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Override the state directory (defaults to `$HOME/.pypm2`).
    #[arg(long, value_name = "PATH", global = true)]
    pub state_dir: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start a new process, or restart it if already registered.
    Start {
        /// Path to the script or executable to run.
        script: String,

        /// Name to register the process under (defaults to the script's stem).
        #[arg(short, long)]
        name: Option<String>,

        /// Working directory for the process (defaults to the current directory).
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Interpreter to invoke the script with (defaults to `python`; pass
        /// an empty string to execute the script directly).
        #[arg(short, long)]
        interpreter: Option<String>,

        /// Extra arguments passed through to the script.
        #[arg(last = true)]
        args: Vec<String>,

        /// Environment variable to set, as KEY=VALUE. May be repeated.
        #[arg(short, long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Maximum number of crash restarts before giving up.
        #[arg(long)]
        max_restarts: Option<u32>,

        /// Delay before restarting a crashed process, in milliseconds.
        #[arg(long)]
        restart_delay: Option<u64>,

        /// Disable automatic restart on crash.
        #[arg(long)]
        no_autorestart: bool,

        /// Restart the process if it exceeds this memory limit, e.g. `512M` or `1G`.
        #[arg(long)]
        max_memory_restart: Option<String>,

        /// Restart the process automatically when its source files change.
        #[arg(long)]
        watch: bool,
    },

    /// Stop a running process, or every registered process when `all` is given.
    Stop {
        /// Name of the process to stop, or `all`.
        name: String,

        /// Skip the graceful SIGTERM phase and send SIGKILL immediately.
        #[arg(long)]
        force: bool,
    },

    /// Restart a process, or every registered process when `all` is given.
    Restart {
        /// Name of the process to restart, or `all`.
        name: String,
    },

    /// Stop and deregister a process, or every registered process when `all` is given.
    Delete {
        /// Name of the process to delete, or `all`.
        name: String,
    },

    /// List all registered processes and their status.
    List {
        /// Emit machine-readable JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show a process's log output.
    Logs {
        /// Name of the process whose logs should be displayed.
        name: String,

        /// Number of trailing lines to show.
        #[arg(short, long, default_value = "20")]
        lines: usize,

        /// Keep streaming newly appended output until interrupted.
        #[arg(short, long)]
        follow: bool,
    },

    /// Truncate a process's log files, or every process's when omitted.
    Flush {
        /// Name of the process to flush. Flushes all processes if omitted.
        name: Option<String>,
    },

    /// Continuously display live status for all processes.
    Monit,

    /// Restart every previously stopped, non-online process.
    Resurrect,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
