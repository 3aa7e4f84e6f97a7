//! Cloud adapter error types
//!
//! The taxonomy mirrors how errors propagate: handshake errors are
//! programming errors and never retried, authentication errors end the
//! current attempt with the triggering status attached, indexing errors
//! distinguish the retryable "not ready yet" state from hard failures, and
//! record issues classify expected protocol noise as ignorable.

use fotosync_core::domain::ZoneArea;
use fotosync_core::session::SessionError;
use thiserror::Error;

/// Errors in the key-agreement handshake. These indicate misuse of the
/// exchange object or malformed server input, never a transient condition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Proof values were requested before the password key was derived
    #[error("Proof requested before password key was derived")]
    KeyNotDerived,

    /// A server-supplied value was not valid base64
    #[error("Invalid encoding in handshake value: {0}")]
    InvalidEncoding(String),

    /// The server's public ephemeral value was zero modulo the group prime
    #[error("Server ephemeral value is invalid")]
    InvalidServerEphemeral,
}

/// Errors raised by the authentication state machine.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized (401): username/password rejected")]
    Unauthorized,

    #[error("Forbidden (403): account is not allowed to sign in")]
    Forbidden,

    #[error("Precondition failed (412): account requires attention")]
    PreconditionFailed,

    #[error("Unexpected HTTP status during authentication: {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed authentication response: {0}")]
    MalformedResponse(String),

    #[error("MFA code required, failing due to fail-on-mfa policy")]
    MfaRequiredPolicy,

    #[error("MFA code rejected with status {0}")]
    MfaRejected(u16),

    #[error("No MFA code received within the verification window")]
    MfaTimeout,

    #[error("MFA transport closed before a code was received")]
    MfaTransportClosed,

    #[error("Unable to persist trust token: {0}")]
    TrustTokenPersist(String),

    #[error("Indexing not finished for {zone} zone")]
    IndexingInProgress { zone: ZoneArea },

    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("Network error during authentication: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AuthError {
    /// True for conditions that a later attempt can clear without user
    /// action (the backend is still indexing the library).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::IndexingInProgress { .. }
                | AuthError::Indexing(IndexingError::InProgress { .. })
        )
    }
}

/// Result of the per-zone indexing probe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexingError {
    /// The backend is still indexing; callers should back off and re-check,
    /// not abandon the sync.
    #[error("Indexing in progress{}", progress.map(|p| format!(" ({p}%)")).unwrap_or_default())]
    InProgress { progress: Option<i64> },

    /// The probe returned a state this client does not understand
    #[error("Unknown indexing state: {0}")]
    UnknownState(String),

    /// The probe response carried no state at all
    #[error("Indexing state unavailable")]
    Unavailable,
}

impl IndexingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexingError::InProgress { .. })
    }
}

/// Reasons a record is dropped without failing the fetch. These are
/// expected protocol noise and surface as warnings at most.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The record is flagged as deleted remotely
    Deleted,
    /// The record is hidden from the library
    Hidden,
    /// One of the synthetic root folders the backend reports
    SyntheticRoot,
    /// A container-relation record (not used by this client)
    ContainerRelation,
    /// A record name already seen within this fetch
    Duplicate,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::Deleted => write!(f, "deleted record"),
            IgnoreReason::Hidden => write!(f, "hidden record"),
            IgnoreReason::SyntheticRoot => write!(f, "synthetic root folder"),
            IgnoreReason::ContainerRelation => write!(f, "container relation record"),
            IgnoreReason::Duplicate => write!(f, "duplicate record name"),
        }
    }
}

/// Issues found while screening or parsing a single wire record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordIssue {
    /// Drop silently or as a warning; never fails the fetch
    #[error("Ignorable record ({reason}): {record_name}")]
    Ignorable {
        record_name: String,
        reason: IgnoreReason,
    },

    /// An entirely unrecognized record type is a failure
    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    /// A required field is missing or has the wrong shape
    #[error("Record {record_name} missing field {field}")]
    MissingField {
        record_name: String,
        field: &'static str,
    },
}

impl RecordIssue {
    /// True when this issue must not propagate as a sync-ending failure.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, RecordIssue::Ignorable { .. })
    }
}
