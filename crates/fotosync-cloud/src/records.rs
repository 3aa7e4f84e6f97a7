//! Wire record parsing
//!
//! Queries return loosely-typed field dictionaries. This module is the
//! single validating step that turns them into a closed set of parsed
//! variants (master / asset / album / indexing probe), rejecting anything
//! outside the expected field set for each type.
//!
//! Screening distinguishes expected protocol noise (deleted records, the
//! synthetic root folders, container relations, duplicates) from genuinely
//! unknown record types: the former are typed ignorable reasons, the latter
//! propagate as failures.

use std::collections::HashSet;

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{IgnoreReason, IndexingError, RecordIssue};
use crate::query::record_types;

/// Synthetic root folders the backend reports but the library never shows.
const SYNTHETIC_ROOTS: &[&str] = &["----Root-Folder----", "----Project-Root-Folder----"];

/// A wire-format record as returned by a query. Transient: parsed
/// immediately into one of the typed variants below or discarded.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "recordName", default)]
    pub record_name: String,
    #[serde(rename = "recordType", default)]
    pub record_type: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
    #[serde(default)]
    pub modified: Option<RecordTimestamp>,
}

/// Modification stamp attached to every record.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordTimestamp {
    pub timestamp: i64,
}

impl RawRecord {
    fn field_value(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).and_then(|field| field.get("value"))
    }

    fn string_field(&self, key: &'static str) -> Result<String, RecordIssue> {
        self.field_value(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(RecordIssue::MissingField {
                record_name: self.record_name.clone(),
                field: key,
            })
    }

    fn int_field(&self, key: &str) -> Option<i64> {
        self.field_value(key).and_then(|value| match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    fn modified_ms(&self) -> i64 {
        self.modified.as_ref().map(|m| m.timestamp).unwrap_or(0)
    }
}

/// A downloadable resource attached to a master or asset record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPointer {
    pub file_checksum: String,
    pub size: u64,
    pub wrapping_key: String,
    pub reference_checksum: String,
    pub download_url: String,
}

impl AssetPointer {
    /// Parses an `ASSETID`-typed field value.
    fn parse(record_name: &str, field: &Value) -> Result<Self, RecordIssue> {
        let missing = |name: &'static str| RecordIssue::MissingField {
            record_name: record_name.to_string(),
            field: name,
        };

        if field.get("type").and_then(Value::as_str) != Some("ASSETID") {
            return Err(missing("type=ASSETID"));
        }
        let value = field.get("value").ok_or_else(|| missing("value"))?;

        Ok(Self {
            file_checksum: value
                .get("fileChecksum")
                .and_then(Value::as_str)
                .ok_or_else(|| missing("fileChecksum"))?
                .to_string(),
            size: value
                .get("size")
                .and_then(Value::as_u64)
                .ok_or_else(|| missing("size"))?,
            wrapping_key: value
                .get("wrappingKey")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            reference_checksum: value
                .get("referenceChecksum")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            download_url: value
                .get("downloadURL")
                .and_then(Value::as_str)
                .ok_or_else(|| missing("downloadURL"))?
                .to_string(),
        })
    }
}

/// The original file behind a library item.
#[derive(Debug, Clone)]
pub struct MasterRecord {
    pub record_name: String,
    pub resource: AssetPointer,
    pub resource_type: String,
    /// Base64 encoded original filename
    pub filename_enc: String,
    pub modified: i64,
}

impl MasterRecord {
    pub fn parse(record: &RawRecord) -> Result<Self, RecordIssue> {
        if record.record_type != record_types::MASTER {
            return Err(RecordIssue::UnknownRecordType(record.record_type.clone()));
        }
        let resource_field =
            record
                .fields
                .get("resOriginalRes")
                .ok_or(RecordIssue::MissingField {
                    record_name: record.record_name.clone(),
                    field: "resOriginalRes",
                })?;
        Ok(Self {
            record_name: record.record_name.clone(),
            resource: AssetPointer::parse(&record.record_name, resource_field)?,
            resource_type: record.string_field("resOriginalFileType")?,
            filename_enc: record.string_field("filenameEnc")?,
            modified: record.modified_ms(),
        })
    }

    /// The decoded original filename.
    pub fn filename(&self) -> Result<String, RecordIssue> {
        decode_name(&self.record_name, &self.filename_enc)
    }
}

/// The current state of a library item, linked to its master.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub record_name: String,
    pub master_ref: String,
    pub favorite: bool,
    pub modified: i64,
    pub adjustment_type: Option<String>,
    /// The edited resource, present when the item was adjusted
    pub resource: Option<AssetPointer>,
    pub resource_type: Option<String>,
}

impl AssetRecord {
    pub fn parse(record: &RawRecord) -> Result<Self, RecordIssue> {
        if record.record_type != record_types::ASSET {
            return Err(RecordIssue::UnknownRecordType(record.record_type.clone()));
        }
        let master_ref = record
            .field_value("masterRef")
            .and_then(|value| value.get("recordName"))
            .and_then(Value::as_str)
            .ok_or(RecordIssue::MissingField {
                record_name: record.record_name.clone(),
                field: "masterRef",
            })?
            .to_string();

        let adjustment_type = record
            .field_value("adjustmentType")
            .and_then(Value::as_str)
            .map(str::to_string);

        // Adjusted items carry their edited resource as either a JPEG or a
        // video rendition
        let mut resource = None;
        let mut resource_type = None;
        if adjustment_type.is_some() {
            if let Some(field) = record.fields.get("resJPEGFullRes") {
                resource = Some(AssetPointer::parse(&record.record_name, field)?);
                resource_type = Some(record.string_field("resJPEGFullFileType")?);
            } else if let Some(field) = record.fields.get("resVidFullRes") {
                resource = Some(AssetPointer::parse(&record.record_name, field)?);
                resource_type = Some(record.string_field("resVidFullFileType")?);
            }
        }

        Ok(Self {
            record_name: record.record_name.clone(),
            master_ref,
            favorite: record.int_field("isFavorite").unwrap_or(0) == 1,
            modified: record.modified_ms(),
            adjustment_type,
            resource,
            resource_type,
        })
    }
}

/// A folder or album record.
#[derive(Debug, Clone)]
pub struct AlbumRecord {
    pub record_name: String,
    /// Wire kind discriminator (0 album, 3 folder)
    pub kind: i64,
    /// Base64 encoded album name
    pub name_enc: String,
    pub parent_id: Option<String>,
    pub modified: i64,
}

impl AlbumRecord {
    pub fn parse(record: &RawRecord) -> Result<Self, RecordIssue> {
        if record.record_type != record_types::ALBUM {
            return Err(RecordIssue::UnknownRecordType(record.record_type.clone()));
        }
        Ok(Self {
            record_name: record.record_name.clone(),
            kind: record.int_field("albumType").ok_or(RecordIssue::MissingField {
                record_name: record.record_name.clone(),
                field: "albumType",
            })?,
            name_enc: record.string_field("albumNameEnc")?,
            parent_id: record
                .field_value("parentId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            modified: record.modified_ms(),
        })
    }

    pub fn name(&self) -> Result<String, RecordIssue> {
        decode_name(&self.record_name, &self.name_enc)
    }

    pub fn is_folder(&self) -> bool {
        self.kind == 3
    }

    pub fn is_album(&self) -> bool {
        self.kind == 0
    }
}

/// Interprets the indexing-state probe response.
///
/// `RUNNING` is a retryable not-ready condition, `FINISHED` means bulk
/// queries are safe, anything else is a hard failure.
pub fn parse_indexing_state(records: &[RawRecord]) -> Result<(), IndexingError> {
    let record = records.first().ok_or(IndexingError::Unavailable)?;
    let state = record
        .field_value("state")
        .and_then(Value::as_str)
        .ok_or(IndexingError::Unavailable)?;

    match state {
        "FINISHED" => Ok(()),
        "RUNNING" => Err(IndexingError::InProgress {
            progress: record.int_field("progress"),
        }),
        other => Err(IndexingError::UnknownState(other.to_string())),
    }
}

/// Screens a picture record before parsing. `seen` holds record names
/// already accepted within this fetch.
pub fn screen_picture_record(
    record: &RawRecord,
    seen: &HashSet<String>,
) -> Result<(), RecordIssue> {
    let ignorable = |reason| RecordIssue::Ignorable {
        record_name: record.record_name.clone(),
        reason,
    };

    if record.deleted {
        return Err(ignorable(IgnoreReason::Deleted));
    }
    if record.int_field("isHidden") == Some(1) {
        return Err(ignorable(IgnoreReason::Hidden));
    }
    if seen.contains(&record.record_name) {
        return Err(ignorable(IgnoreReason::Duplicate));
    }
    if record.record_type == record_types::CONTAINER_RELATION {
        return Err(ignorable(IgnoreReason::ContainerRelation));
    }
    if record.record_type != record_types::MASTER && record.record_type != record_types::ASSET {
        return Err(RecordIssue::UnknownRecordType(record.record_type.clone()));
    }
    Ok(())
}

/// Screens an album record before parsing.
pub fn screen_album_record(record: &RawRecord) -> Result<(), RecordIssue> {
    let ignorable = |reason| RecordIssue::Ignorable {
        record_name: record.record_name.clone(),
        reason,
    };

    if record.deleted {
        return Err(ignorable(IgnoreReason::Deleted));
    }
    if SYNTHETIC_ROOTS.contains(&record.record_name.as_str()) {
        return Err(ignorable(IgnoreReason::SyntheticRoot));
    }
    if record.record_type != record_types::ALBUM {
        return Err(RecordIssue::UnknownRecordType(record.record_type.clone()));
    }
    Ok(())
}

fn decode_name(record_name: &str, encoded: &str) -> Result<String, RecordIssue> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| RecordIssue::MissingField {
            record_name: record_name.to_string(),
            field: "decodable name",
        })?;
    String::from_utf8(bytes).map_err(|_| RecordIssue::MissingField {
        record_name: record_name.to_string(),
        field: "utf8 name",
    })
}
