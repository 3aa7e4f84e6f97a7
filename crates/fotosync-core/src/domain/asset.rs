//! Asset entity
//!
//! An asset is a single photo or video version in the library. Its identity
//! is the content checksum reported by the backend, which is stable across
//! fetches and therefore the anchor for idempotent diffing: re-fetching the
//! same remote state always yields the same identity.
//!
//! On disk, assets are stored under a filename-safe encoding of the checksum
//! plus the file extension, so the local library can be loaded back into the
//! same identity space without any sidecar database.

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::entity::RemoteEntity;
use super::errors::DomainError;
use super::zone::ZoneArea;

/// Tolerance for modification-time equality, in milliseconds.
///
/// Filesystems truncate timestamps with varying precision, so a strict
/// comparison would flag unchanged assets as modified.
pub const MTIME_TOLERANCE_MS: i64 = 1000;

/// Which version of a library item an asset represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    /// The original file as imported
    Original,
    /// The most recent edit
    Edit,
}

/// Remote download coordinates for an asset
///
/// Only present on assets built from remote records. Local loads have no
/// locator and can only be kept or deleted, never re-uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLocator {
    /// The backend URL serving the asset bytes
    pub download_url: String,
    /// Opaque wrapping key returned by the backend
    pub wrapping_key: String,
    /// Secondary checksum returned by the backend
    pub reference_checksum: String,
    /// Record name of the owning asset record (needed for deletion)
    pub record_name: String,
}

/// A domain photo/video item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Content checksum (standard base64), the stable identity
    pub checksum: String,
    /// File size in bytes
    pub size: u64,
    /// Modification time, epoch milliseconds
    pub modified: i64,
    /// File extension without leading dot (e.g. `jpeg`, `mov`)
    pub extension: String,
    /// Which version this asset is
    pub kind: AssetKind,
    /// The original filename without extension, as imported
    pub orig_filename: String,
    /// The zone this asset belongs to
    pub zone: ZoneArea,
    /// Favorite flag from the backend
    pub favorite: bool,
    /// Remote download coordinates, absent for locally-loaded assets
    pub locator: Option<AssetLocator>,
}

impl Asset {
    /// Builds an asset from a local file name and metadata.
    ///
    /// The file name is expected to be the output of [`Asset::asset_filename`]:
    /// a URL-safe base64 checksum plus extension.
    pub fn from_file(
        file_name: &str,
        size: u64,
        modified: i64,
        zone: ZoneArea,
    ) -> Result<Self, DomainError> {
        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DomainError::InvalidAssetFilename(file_name.to_string()))?;
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(stem)
            .map_err(|_| DomainError::InvalidAssetFilename(file_name.to_string()))?;
        let checksum = base64::engine::general_purpose::STANDARD.encode(raw);

        Ok(Self {
            checksum,
            size,
            modified,
            extension,
            kind: AssetKind::Original,
            orig_filename: String::new(),
            zone,
            favorite: false,
            locator: None,
        })
    }

    /// The filename-safe encoded identity with the correct extension.
    ///
    /// This is how the asset is stored on disk.
    pub fn asset_filename(&self) -> String {
        let encoded = match base64::engine::general_purpose::STANDARD.decode(&self.checksum) {
            Ok(raw) => base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw),
            // Checksum arrived in a non-base64 shape, keep it verbatim
            Err(_) => self.checksum.clone(),
        };
        if self.extension.is_empty() {
            encoded
        } else {
            format!("{}.{}", encoded, self.extension)
        }
    }

    /// The human readable filename, based on the original import name.
    pub fn pretty_filename(&self) -> String {
        let suffix = match self.kind {
            AssetKind::Original => "",
            AssetKind::Edit => "-edited",
        };
        if self.extension.is_empty() {
            format!("{}{}", self.orig_filename, suffix)
        } else {
            format!("{}{}.{}", self.orig_filename, suffix, self.extension)
        }
    }

    /// Checks whether two epoch-ms timestamps are within the tolerance window.
    pub fn mtime_within_range(a: i64, b: i64) -> bool {
        (a - b).abs() <= MTIME_TOLERANCE_MS
    }
}

impl RemoteEntity for Asset {
    fn identity(&self) -> &str {
        &self.checksum
    }

    fn display_name(&self) -> &str {
        &self.checksum
    }

    /// Equality based on checksum, file type, size and modification time
    /// (within tolerance). Locator fields do not participate, so a re-issued
    /// download URL does not force a re-download.
    fn matches(&self, other: &Self) -> bool {
        self.checksum == other.checksum
            && self.extension == other.extension
            && self.size == other.size
            && Self::mtime_within_range(self.modified, other.modified)
    }
}
