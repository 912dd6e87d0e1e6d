//! Configuration file loading and XDG lookup.
//!
//! The configuration is a TOML file listing the commands to run:
//!
//! ```toml
//! interval = 3600
//! state_dir = "/var/lib/dachs"
//! differ = "git"
//!
//! [[command]]
//! name = "listening sockets"
//! run = "ss -tln"
//! interval = 600
//! ```

use crate::differ::DifferKind;
use crate::gate::DEFAULT_INTERVAL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "dachs.conf";
const APP_DIRNAME: &str = "dachs";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("No dachs.conf found (searched {})", display_dirs(.0))]
    NotFound(Vec<PathBuf>),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn display_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single command to run and track.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    #[serde(default)]
    pub name: String,
    /// Shell command text; also the sole input to the command's identity.
    pub run: String,
    /// Accepted and carried along, but not applied to the output.
    #[serde(default)]
    pub filter: Vec<String>,
    /// Seconds between runs, overriding the global interval.
    #[serde(default)]
    pub interval: Option<u64>,
    /// Seconds after which the command is killed.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl CommandSpec {
    /// The name, or the command text for unnamed commands.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.run
        } else {
            &self.name
        }
    }

    pub fn interval_or(&self, default: Duration) -> Duration {
        self.interval.map(Duration::from_secs).unwrap_or(default)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub differ: DifferKind,
    #[serde(default, rename = "command")]
    pub commands: Vec<CommandSpec>,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config file. A relative `state_dir` is resolved against the
    /// directory containing the file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ConfigError::PermissionDenied(path.to_path_buf())
            } else {
                ConfigError::Io(path.to_path_buf(), e)
            }
        })?;

        let mut config = Self::from_toml(&content)?;

        if let Some(state_dir) = &config.state_dir
            && state_dir.is_relative()
        {
            let base = path.parent().unwrap_or(Path::new("."));
            config.state_dir = Some(base.join(state_dir));
        }

        Ok(config)
    }

    /// Interval for commands that do not set their own.
    pub fn default_interval(&self) -> Duration {
        self.interval
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_INTERVAL)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (index, command) in self.commands.iter().enumerate() {
            if command.run.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "command #{} has an empty `run`",
                    index + 1
                )));
            }
            if command.timeout == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "command {:?} has a zero `timeout`",
                    command.label()
                )));
            }
        }
        Ok(())
    }
}

/// Directories searched for [`CONFIG_FILENAME`], most specific first.
///
/// Follows the XDG base directory spec: `$XDG_CONFIG_HOME` (default
/// `~/.config`), then each entry of `$XDG_CONFIG_DIRS` (default `/etc/xdg`).
pub fn config_search_dirs(env: impl Fn(&str) -> Option<String>, home: Option<&Path>) -> Vec<PathBuf> {
    let non_empty = |key: &str| env(key).filter(|v| !v.is_empty());

    let mut dirs = Vec::new();

    match non_empty("XDG_CONFIG_HOME") {
        Some(config_home) => dirs.push(PathBuf::from(config_home)),
        None => {
            if let Some(home) = home {
                dirs.push(home.join(".config"));
            }
        }
    }

    match non_empty("XDG_CONFIG_DIRS") {
        Some(config_dirs) => dirs.extend(
            config_dirs
                .split(':')
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
        ),
        None => dirs.push(PathBuf::from("/etc/xdg")),
    }

    dirs
}

/// Returns the first existing config file in the search path.
pub fn find_config(env: impl Fn(&str) -> Option<String>, home: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let dirs = config_search_dirs(env, home);

    let found = dirs
        .iter()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .find(|candidate| candidate.is_file());

    found.ok_or(ConfigError::NotFound(dirs))
}

/// Searches for the config file using the process environment.
pub fn find_config_from_env() -> Result<PathBuf, ConfigError> {
    find_config(|key| std::env::var(key).ok(), dirs::home_dir().as_deref())
}

/// `$XDG_STATE_HOME/dachs`, falling back to `~/.local/state/dachs`.
pub fn default_state_dir(env: impl Fn(&str) -> Option<String>, home: Option<&Path>) -> Option<PathBuf> {
    env("XDG_STATE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|h| h.join(".local").join("state")))
        .map(|base| base.join(APP_DIRNAME))
}

pub fn default_state_dir_from_env() -> Option<PathBuf> {
    default_state_dir(|key| std::env::var(key).ok(), dirs::home_dir().as_deref())
}
