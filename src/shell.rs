use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Unable to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Command failed with {0}")]
    Failed(ExitStatus),
    #[error("Command timed out after {}s and was killed", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("IO error while running command: {0}")]
    Io(#[source] io::Error),
}

/// Runs command text and captures its standard output.
pub trait Shell {
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<Vec<u8>, ExecError>;
}

/// Runs commands through `<program> -c <command>`.
///
/// Standard error is inherited so the operator sees it; standard input is
/// closed since runs are meant to be unattended.
#[derive(Debug, Clone)]
pub struct SystemShell {
    program: String,
}

impl SystemShell {
    pub fn new(program: impl Into<String>) -> Self {
        SystemShell {
            program: program.into(),
        }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        SystemShell::new("sh")
    }
}

impl Shell for SystemShell {
    fn run(&self, command: &str, timeout: Option<Duration>) -> Result<Vec<u8>, ExecError> {
        debug!("Running {:?} via {}", command, self.program);

        let mut cmd = Command::new(&self.program);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        // A dedicated process group lets a timeout take down everything the
        // command spawned, not just the shell.
        #[cfg(unix)]
        if timeout.is_some() {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // A deadline past the representable range is as good as none.
        let deadline = timeout.and_then(|limit| Some((limit, Instant::now().checked_add(limit)?)));

        let (status, stdout) = match deadline {
            None => {
                let output = child.wait_with_output().map_err(ExecError::Io)?;
                (output.status, output.stdout)
            }
            Some((limit, deadline)) => wait_with_deadline(child, limit, deadline)?,
        };

        if !status.success() {
            return Err(ExecError::Failed(status));
        }

        debug!("Captured {} bytes of output", stdout.len());
        Ok(stdout)
    }
}

/// Waits for `child` and for its standard output to close, both within
/// `deadline`.
///
/// Background members of the process group can hold stdout open after the
/// shell exits, so the output counts against the deadline too. Whatever is
/// left of the group afterwards is killed.
fn wait_with_deadline(
    mut child: Child,
    limit: Duration,
    deadline: Instant,
) -> Result<(ExitStatus, Vec<u8>), ExecError> {
    let Some(mut pipe) = child.stdout.take() else {
        return Err(ExecError::Io(io::Error::other("stdout was not captured")));
    };

    // Drain stdout concurrently so a chatty command cannot fill the pipe and
    // stall before the deadline is reached.
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let read = pipe.read_to_end(&mut buf).map(|_| buf);
        if tx.send(read).is_err() {
            debug!("Discarding output of a command that timed out");
        }
    });

    let status = loop {
        if let Some(status) = child.try_wait().map_err(ExecError::Io)? {
            break status;
        }
        if Instant::now() >= deadline {
            kill_process_group(&mut child);
            child.wait().map_err(ExecError::Io)?;
            return Err(ExecError::TimedOut(limit));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    let stdout = match rx.recv_timeout(remaining) {
        Ok(read) => read.map_err(ExecError::Io)?,
        Err(RecvTimeoutError::Timeout) => {
            debug!("Command exited but its stdout is still held open");
            kill_process_group(&mut child);
            return Err(ExecError::TimedOut(limit));
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(ExecError::Io(io::Error::other("stdout reader panicked")));
        }
    };

    kill_process_group(&mut child);
    Ok((status, stdout))
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = match i32::try_from(child.id()) {
        Ok(pid) => Pid::from_raw(pid),
        Err(e) => {
            warn!("Process id {} out of range: {}", child.id(), e);
            return;
        }
    };

    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => debug!("Killed process group {}", pgid),
        // Nothing left in the group.
        Err(Errno::ESRCH) => {}
        Err(e) => {
            warn!("Unable to kill process group {}: {}", pgid, e);
            if let Err(e) = child.kill() {
                warn!("Unable to kill process {}: {}", pgid, e);
            }
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Unable to kill process {}: {}", child.id(), e);
    }
}
