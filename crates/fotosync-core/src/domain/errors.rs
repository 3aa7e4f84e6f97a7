//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and malformed entity data.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Checksum is not valid standard base64
    #[error("Invalid checksum encoding: {0}")]
    InvalidChecksum(String),

    /// A file name could not be interpreted as an asset identity
    #[error("Invalid asset file name: {0}")]
    InvalidAssetFilename(String),

    /// An album record carried an unknown kind discriminator
    #[error("Unknown album kind: {0}")]
    UnknownAlbumKind(i64),

    /// A zone reference is missing a required field
    #[error("Invalid zone reference: {0}")]
    InvalidZone(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
