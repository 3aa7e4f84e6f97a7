//! Library lock file
//!
//! A pid file guards the local library against concurrent sync runs. The
//! lock is checked-and-acquired before an engine attempt and held for the
//! duration of the sync; a recorded holder that is no longer running counts
//! as stale and is cleared. The force flag overrides a live foreign holder
//! (at the user's risk).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the lock file inside the data directory.
const LOCK_FILE_NAME: &str = ".library.lock";

/// Lock acquisition errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// A running process holds the lock; proceeding would risk two writers
    /// on the same library.
    #[error("Library locked by running process {pid}")]
    Locked { pid: i32 },

    #[error("Lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the on-disk library lock.
#[derive(Debug, Clone)]
pub struct LibraryLock {
    path: PathBuf,
}

/// Proof of an acquired lock; releases it on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LibraryLock {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(LOCK_FILE_NAME),
        }
    }

    /// Atomically checks and acquires the lock.
    ///
    /// An existing lock held by a running process fails with
    /// [`LockError::Locked`] unless `force` is set; a stale lock (dead
    /// holder) is cleared first.
    pub fn acquire(&self, force: bool) -> Result<LockGuard, LockError> {
        if let Some(holder) = self.read_holder()? {
            if pid_is_running(holder) && !force {
                return Err(LockError::Locked { pid: holder });
            }
            info!(holder, "Clearing stale library lock");
            std::fs::remove_file(&self.path)?;
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, std::process::id().to_string())?;
        debug!(path = %self.path.display(), "Library lock acquired");
        Ok(LockGuard {
            path: self.path.clone(),
        })
    }

    /// Reads the recorded holder pid, if a lock file exists.
    fn read_holder(&self) -> Result<Option<i32>, LockError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim().parse().ok()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl LockGuard {
    /// Explicitly releases the lock.
    pub fn release(self) {
        // Drop does the work
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "Unable to remove library lock");
        }
    }
}

/// Probes whether a process with the given pid is running.
fn pid_is_running(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 performs the existence check without sending anything
    unsafe { libc::kill(pid, 0) == 0 }
}
