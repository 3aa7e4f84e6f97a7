//! Non-fatal sync diagnostics
//!
//! Partial success is an observable return value: per-record and per-entity
//! issues are collected into typed warnings and returned alongside the sync
//! result, instead of disappearing into the log.

use serde::{Deserialize, Serialize};

/// A non-fatal issue encountered during fetch or write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncWarning {
    /// A wire record was dropped during parsing for an expected reason
    RecordDropped {
        record_name: String,
        reason: String,
    },
    /// The number of parsed records did not match the index-count lookup
    CountMismatch {
        scope: String,
        expected: usize,
        masters: usize,
        assets: usize,
    },
    /// One asset could not be written/verified; the batch continued
    AssetWriteFailed {
        identity: String,
        reason: String,
    },
    /// One album could not be written/deleted; the batch continued
    AlbumWriteFailed {
        identity: String,
        reason: String,
    },
    /// An MFA resend response did not have the expected shape
    MfaResendUnverified {
        detail: String,
    },
    /// The between-retries session refresh failed; the sync aborted with an
    /// empty result
    SessionRefreshFailed {
        reason: String,
    },
}

impl std::fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncWarning::RecordDropped {
                record_name,
                reason,
            } => write!(f, "Dropped record {record_name}: {reason}"),
            SyncWarning::CountMismatch {
                scope,
                expected,
                masters,
                assets,
            } => write!(
                f,
                "Count mismatch for {scope}: expected {expected} pairs, got {masters} masters and {assets} assets"
            ),
            SyncWarning::AssetWriteFailed { identity, reason } => {
                write!(f, "Failed to write asset {identity}: {reason}")
            }
            SyncWarning::AlbumWriteFailed { identity, reason } => {
                write!(f, "Failed to write album {identity}: {reason}")
            }
            SyncWarning::MfaResendUnverified { detail } => {
                write!(f, "MFA resend response not verifiable: {detail}")
            }
            SyncWarning::SessionRefreshFailed { reason } => {
                write!(f, "Session refresh failed, sync aborted: {reason}")
            }
        }
    }
}
