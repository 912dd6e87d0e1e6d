use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch setup with a config file and a state directory next to it.
pub struct Setup {
    pub temp: TempDir,
}

impl Setup {
    /// Writes `commands` (TOML `[[command]]` tables) into a config that uses
    /// the builtin differ and a `state` directory inside the temp dir.
    pub fn new(commands: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let config = format!("differ = \"builtin\"\nstate_dir = \"state\"\n\n{commands}");
        fs::write(temp.path().join("dachs.conf"), config).unwrap();
        Setup { temp }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn config(&self) -> PathBuf {
        self.path().join("dachs.conf")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path().join("state")
    }

    /// `dachs -c <config>` with a clean logging environment.
    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("dachs");
        cmd.env_remove("RUST_LOG")
            .env_remove("DACHS_CONFIG")
            .arg("-c")
            .arg(self.config());
        cmd
    }

    /// Contents of every file in the state directory.
    // Not every integration test crate inspects state directly.
    #[allow(dead_code)]
    pub fn state_files(&self) -> Vec<Vec<u8>> {
        let mut entries: Vec<_> = fs::read_dir(self.state_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries.into_iter().map(|p| fs::read(p).unwrap()).collect()
    }
}
