mod help_text;

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Run shell commands periodically and report changes in their output
#[derive(Parser, Debug)]
#[command(name = "dachs", version, about, long_about = help_text::ROOT_LONG_ABOUT)]
pub struct Cli {
    /// Config file to use instead of searching the XDG config directories
    #[arg(short, long, value_name = "PATH", env = "DACHS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run every command regardless of its interval
    #[arg(short, long)]
    pub force: bool,

    /// Directory holding the last output of each command (overrides state_dir)
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Increase logging (-v info, -vv debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "log_level")]
    pub verbose: u8,

    /// Set the log level explicitly. Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Explicitly requested filter, if any; `None` defers to RUST_LOG.
    pub fn log_filter(&self) -> Option<&'static str> {
        if let Some(level) = self.log_level {
            return Some(level.as_filter());
        }
        match self.verbose {
            0 => None,
            1 => Some("info"),
            _ => Some("debug"),
        }
    }
}
