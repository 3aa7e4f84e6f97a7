//! Sync error types and the retry ledger

use thiserror::Error;

/// One failed sync attempt, kept for the aggregate error.
#[derive(Debug)]
pub struct AttemptFailure {
    pub attempt: u32,
    pub cause: anyhow::Error,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt {}: {:#}", self.attempt, self.cause)
    }
}

/// Accumulated failure context for one sync invocation.
#[derive(Debug, Default)]
pub struct RetryLedger {
    failures: Vec<AttemptFailure>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attempt: u32, cause: anyhow::Error) {
        self.failures.push(AttemptFailure { attempt, cause });
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Raises the ledger as one aggregate error carrying every attempt's
    /// cause.
    pub fn into_error(self) -> SyncError {
        SyncError::MaxRetriesExceeded {
            attempts: self.failures,
        }
    }
}

/// Errors terminating a sync invocation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The album parent graph contains a cycle; a protocol violation, never
    /// retried.
    #[error("Album hierarchy contains a cycle involving {identity}")]
    HierarchyCycle { identity: String },

    /// Another running process holds the library lock.
    #[error("Library locked by running process {pid}")]
    Locked { pid: i32 },

    /// An attempt failed in a way a retry cannot fix.
    #[error("Unrecoverable sync failure on attempt {attempt}: {cause:#}")]
    Fatal { attempt: u32, cause: anyhow::Error },

    /// The configured attempt bound was exhausted; carries every attempt's
    /// cause for diagnosis.
    #[error("Sync failed after {} attempts: [{}]", attempts.len(), format_attempts(attempts))]
    MaxRetriesExceeded { attempts: Vec<AttemptFailure> },
}

fn format_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(AttemptFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Classifies whether an attempt failure is worth a retry.
///
/// Bad responses, bad requests (e.g. expired session cookies) and network
/// hiccups clear up after a session refresh; anything else aborts the sync.
pub fn is_recoverable(err: &anyhow::Error) -> bool {
    let text = format!("{err:#}").to_lowercase();

    // Network level
    if text.contains("connection")
        || text.contains("timeout")
        || text.contains("timed out")
        || text.contains("dns")
        || text.contains("reset by peer")
        || text.contains("broken pipe")
        || text.contains("request failed")
    {
        return true;
    }

    // HTTP level: any status error clears with a fresh session or backoff
    if text.contains("returned status") || text.contains("too many requests") {
        return true;
    }

    false
}
