use crate::config::CommandSpec;
use crate::differ::LineDiffer;
use crate::gate::is_due;
use crate::report::format_instant;
use crate::shell::{ExecError, Shell};
use crate::state::{StateError, StateKey, StateStore};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Run-wide settings, resolved by the caller from flags and configuration.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Run every command regardless of its interval.
    pub force: bool,
    /// Interval for commands that do not set their own.
    pub default_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecError),
    #[error("Unable to save state: {0}")]
    Persist(#[from] StateError),
}

/// What happened to a single command.
#[derive(Debug)]
pub enum Outcome {
    /// Not due yet; nothing ran and nothing changed.
    Skipped,
    /// The command could not run or exited unsuccessfully. The previous
    /// state is untouched.
    ExecutionFailed(ExecError),
    /// The command ran. `diff` may be empty; `persist_error` is set when the
    /// new output could not be saved.
    Completed {
        diff: Vec<u8>,
        persist_error: Option<StateError>,
    },
}

impl Outcome {
    pub fn diff(&self) -> &[u8] {
        match self {
            Outcome::Completed { diff, .. } => diff,
            Outcome::Skipped | Outcome::ExecutionFailed(_) => &[],
        }
    }

    /// Splits into the diff bytes and the error to report, either of which
    /// may be present independently.
    pub fn into_parts(self) -> (Vec<u8>, Option<CommandError>) {
        match self {
            Outcome::Skipped => (Vec::new(), None),
            Outcome::ExecutionFailed(e) => (Vec::new(), Some(e.into())),
            Outcome::Completed {
                diff,
                persist_error,
            } => (diff, persist_error.map(Into::into)),
        }
    }
}

/// Gate, execute, compare and persist one command at a time.
pub struct Pipeline<'a> {
    store: &'a StateStore,
    shell: &'a dyn Shell,
    differ: &'a dyn LineDiffer,
    settings: Settings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a StateStore,
        shell: &'a dyn Shell,
        differ: &'a dyn LineDiffer,
        settings: Settings,
    ) -> Self {
        Pipeline {
            store,
            shell,
            differ,
            settings,
        }
    }

    /// Runs `spec` if it is due at `now`.
    ///
    /// The stored output is replaced only after a successful execution, so a
    /// failing command never disturbs the last known-good baseline. Failures
    /// to read the old state or to compute the diff are logged and degrade to
    /// an empty baseline or an empty diff respectively.
    pub fn run(&self, spec: &CommandSpec, now: SystemTime) -> Outcome {
        let key = StateKey::derive(&spec.run);
        let interval = spec.interval_or(self.settings.default_interval);
        let last_run = self.store.last_run(&key);

        debug!("Command {:?} has state key {}", spec.label(), key);

        if !is_due(last_run, interval, now, self.settings.force) {
            info!(
                "Skipping {:?}: last ran {}, interval is {}s",
                spec.label(),
                format_instant(last_run),
                interval.as_secs()
            );
            return Outcome::Skipped;
        }

        if !spec.filter.is_empty() {
            debug!(
                "Command {:?} lists {} filter(s); filters are not applied",
                spec.label(),
                spec.filter.len()
            );
        }

        let output = match self.shell.run(&spec.run, spec.timeout()) {
            Ok(output) => output,
            Err(e) => return Outcome::ExecutionFailed(e),
        };

        let previous = match self.store.load(&key) {
            Ok(Some(previous)) => previous,
            Ok(None) => {
                debug!("No previous output for {:?}", spec.label());
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "Unable to read previous output of {:?}, comparing against nothing: {}",
                    spec.label(),
                    e
                );
                Vec::new()
            }
        };

        let diff = match self.differ.diff(&previous, &output) {
            Ok(diff) => diff,
            Err(e) => {
                warn!("Unable to compare output of {:?}: {}", spec.label(), e);
                Vec::new()
            }
        };

        let persist_error = self.store.save(&key, &output).err();

        Outcome::Completed {
            diff,
            persist_error,
        }
    }
}
