//! Content-addressed storage of the most recent output of each command.
//!
//! Every distinct command text maps to exactly one file directly inside the
//! state directory, named by the hex SHA-256 of the command text. The file
//! holds the raw standard output of the last successful run, and its
//! modification time doubles as the "last run" marker.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("IO error on {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
}

impl StateError {
    fn from_io(path: &Path, e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::PermissionDenied {
            StateError::PermissionDenied(path.to_path_buf())
        } else {
            StateError::Io(path.to_path_buf(), e)
        }
    }
}

/// Identity of a command's state slot.
///
/// Two commands with identical text share a key, and therefore a state file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey(String);

impl StateKey {
    /// Hex encoded SHA-256 of the raw command text.
    pub fn derive(run: &str) -> Self {
        let digest = Sha256::digest(run.as_bytes());
        StateKey(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Opens the state directory, creating it (and its parents) if missing.
    pub fn open(dir: &Path) -> Result<Self, StateError> {
        std::fs::create_dir_all(dir).map_err(|e| StateError::from_io(dir, e))?;
        Ok(StateStore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn location(&self, key: &StateKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Returns when the command behind `key` last ran successfully.
    ///
    /// A missing state file yields the Unix epoch, i.e. "never ran". Any other
    /// failure to stat the file is logged and also yields the epoch, so the
    /// command is treated as due rather than silently never being checked.
    pub fn last_run(&self, key: &StateKey) -> SystemTime {
        let path = self.location(key);
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) if e.kind() == ErrorKind::NotFound => UNIX_EPOCH,
            Err(e) => {
                warn!(
                    "Unable to determine last run from {}, treating as due: {}",
                    path.display(),
                    e
                );
                UNIX_EPOCH
            }
        }
    }

    /// Loads the previously persisted output, or `None` if there is none.
    pub fn load(&self, key: &StateKey) -> Result<Option<Vec<u8>>, StateError> {
        let path = self.location(key);
        match std::fs::read(&path) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::from_io(&path, e)),
        }
    }

    /// Replaces the persisted output for `key` atomically.
    ///
    /// Writes to a temporary file in the state directory, fsyncs it, then
    /// renames it over the state file. The temporary file is removed on every
    /// error path when it is dropped.
    pub fn save(&self, key: &StateKey, payload: &[u8]) -> Result<(), StateError> {
        let path = self.location(key);

        let mut temp_file = tempfile::Builder::new()
            .prefix(".dachs-state-")
            .tempfile_in(&self.dir)
            .map_err(|e| StateError::from_io(&self.dir, e))?;

        temp_file
            .write_all(payload)
            .map_err(|e| StateError::from_io(temp_file.path(), e))?;

        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StateError::from_io(&path, e))?;

        temp_file
            .persist(&path)
            .map_err(|e| StateError::from_io(&path, e.error))?;

        debug!("Saved {} bytes to {}", payload.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    #[test]
    fn key_is_hex_sha256_of_command_text() {
        assert_eq!(
            StateKey::derive("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            StateKey::derive("Hello, world!").as_str(),
            "315f5bdb76d078c43b8ac0064e4a0164612b1fce77c869345bfc94c75894edd3"
        );
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(StateKey::derive("uptime"), StateKey::derive("uptime"));
    }

    #[test]
    fn key_distinguishes_command_texts() {
        assert_ne!(StateKey::derive("ls /etc"), StateKey::derive("ls /etc "));
        assert_ne!(StateKey::derive("a"), StateKey::derive("b"));
    }

    #[test]
    fn open_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("state");

        let store = StateStore::open(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn location_is_key_inside_state_dir() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let key = StateKey::derive("date");

        assert_eq!(store.location(&key), temp.path().join(key.as_str()));
    }

    #[test]
    fn last_run_without_state_is_epoch() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        assert_eq!(store.last_run(&StateKey::derive("never")), UNIX_EPOCH);
    }

    #[test]
    fn last_run_is_state_file_mtime() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let key = StateKey::derive("echo hi");
        store.save(&key, b"hi\n").unwrap();

        let mtime = FileTime::from_unix_time(1_700_000_000, 0);
        set_file_mtime(store.location(&key), mtime).unwrap();

        let expected = UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        assert_eq!(store.last_run(&key), expected);
    }

    #[test]
    fn load_missing_state_is_none() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();

        assert!(store.load(&StateKey::derive("nothing")).unwrap().is_none());
    }

    #[test]
    fn save_then_load_returns_payload_verbatim() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let key = StateKey::derive("printf '\\x00\\xff'");

        store.save(&key, &[0x00, 0xff, b'\n']).unwrap();

        assert_eq!(store.load(&key).unwrap(), Some(vec![0x00, 0xff, b'\n']));
    }

    #[test]
    fn save_replaces_previous_payload() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let key = StateKey::derive("cat /etc/hosts");

        store.save(&key, b"a much longer first payload\n").unwrap();
        store.save(&key, b"short\n").unwrap();

        assert_eq!(store.load(&key).unwrap(), Some(b"short\n".to_vec()));
    }

    #[test]
    fn save_leaves_only_the_state_file() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        let key = StateKey::derive("id");

        store.save(&key, b"uid=0\n").unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![key.as_str().to_string()]);
    }

    #[test]
    #[cfg(unix)]
    fn save_into_read_only_directory_fails() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = StateStore::open(temp.path()).unwrap();
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o555)).unwrap();

        let result = store.save(&StateKey::derive("true"), b"");

        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o755)).unwrap();

        // root ignores directory permissions
        if !nix::unistd::geteuid().is_root() {
            assert!(matches!(result, Err(StateError::PermissionDenied(_))));
        }
    }

    #[test]
    fn last_run_is_epoch_when_state_dir_is_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("state");
        let store = StateStore::open(&dir).unwrap();
        std::fs::remove_dir(&dir).unwrap();
        std::fs::write(&dir, b"not a directory").unwrap();

        assert_eq!(store.last_run(&StateKey::derive("uptime")), UNIX_EPOCH);
    }

    #[test]
    fn io_error_message_names_path_and_cause() {
        let err = StateError::Io(
            PathBuf::from("/var/lib/dachs/abc"),
            std::io::Error::other("disk on fire"),
        );

        assert_eq!(err.to_string(), "IO error on /var/lib/dachs/abc: disk on fire");
    }
}
