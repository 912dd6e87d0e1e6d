//! Line-oriented comparison of a command's previous and current output.
//!
//! Two implementations exist: [`ExternalDiffer`] shells out to a diff program
//! operating on two scratch files, and [`BuiltinDiffer`] computes a unified
//! diff in process.

use serde::Deserialize;
use similar::TextDiff;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

const OLD_FILENAME: &str = "old";
const NEW_FILENAME: &str = "new";

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("Scratch directory error: {0}")]
    Scratch(#[source] io::Error),
    #[error("Unable to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with unexpected {status}")]
    UnexpectedStatus { program: String, status: ExitStatus },
    #[error("Unable to render diff: {0}")]
    Render(#[source] io::Error),
}

/// Computes a human-readable diff between two byte sequences.
///
/// An empty result means "no differences".
pub trait LineDiffer {
    fn diff(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>, DiffError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferKind {
    /// `git diff --no-index`
    #[default]
    Git,
    /// POSIX `diff -u`
    Diff,
    /// In-process unified diff
    Builtin,
}

pub fn differ_for(kind: DifferKind) -> Box<dyn LineDiffer> {
    match kind {
        DifferKind::Git => Box::new(ExternalDiffer::git()),
        DifferKind::Diff => Box::new(ExternalDiffer::posix()),
        DifferKind::Builtin => Box::new(BuiltinDiffer::default()),
    }
}

/// Runs an external diff program against `old` and `new` files materialized
/// in a private scratch directory.
///
/// The program is invoked as `<program> <args...> old new` with the scratch
/// directory as its working directory. Exit status 0 means no differences and
/// 1 means differences were found; anything else is an error.
#[derive(Debug, Clone)]
pub struct ExternalDiffer {
    program: String,
    args: Vec<String>,
    scratch_parent: Option<PathBuf>,
}

impl ExternalDiffer {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExternalDiffer {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            scratch_parent: None,
        }
    }

    pub fn git() -> Self {
        ExternalDiffer::new("git", ["diff", "--no-index", "--no-color", "--"])
    }

    pub fn posix() -> Self {
        ExternalDiffer::new("diff", ["-u"])
    }

    /// Creates scratch directories under `dir` instead of the system default.
    #[cfg(test)]
    pub fn with_scratch_parent(mut self, dir: &Path) -> Self {
        self.scratch_parent = Some(dir.to_path_buf());
        self
    }

    fn diff_in(&self, dir: &Path, old: &[u8], new: &[u8]) -> Result<Vec<u8>, DiffError> {
        std::fs::write(dir.join(OLD_FILENAME), old).map_err(DiffError::Scratch)?;
        std::fs::write(dir.join(NEW_FILENAME), new).map_err(DiffError::Scratch)?;

        debug!("Comparing {} and {} with {}", OLD_FILENAME, NEW_FILENAME, self.program);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(OLD_FILENAME)
            .arg(NEW_FILENAME)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| DiffError::Launch {
                program: self.program.clone(),
                source,
            })?;

        match output.status.code() {
            Some(0) | Some(1) => Ok(output.stdout),
            _ => Err(DiffError::UnexpectedStatus {
                program: self.program.clone(),
                status: output.status,
            }),
        }
    }
}

impl LineDiffer for ExternalDiffer {
    fn diff(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>, DiffError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dachs-compare-");
        let scratch = match &self.scratch_parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(DiffError::Scratch)?;

        let result = self.diff_in(scratch.path(), old, new);

        // Removal happens on every path; a comparison error takes precedence
        // over a removal error.
        let removed = scratch.close().map_err(DiffError::Scratch);
        let diff = result?;
        removed?;
        Ok(diff)
    }
}

/// Unified diff computed in process over raw bytes, split on `\n`.
#[derive(Debug, Clone)]
pub struct BuiltinDiffer {
    context: usize,
}

impl Default for BuiltinDiffer {
    fn default() -> Self {
        BuiltinDiffer { context: 3 }
    }
}

impl LineDiffer for BuiltinDiffer {
    fn diff(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>, DiffError> {
        let diff = TextDiff::from_lines(old, new);

        let mut unified = Vec::new();
        diff.unified_diff()
            .context_radius(self.context)
            .header(OLD_FILENAME, NEW_FILENAME)
            .to_writer(&mut unified)
            .map_err(DiffError::Render)?;

        Ok(unified)
    }
}
