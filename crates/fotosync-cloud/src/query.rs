//! Query dialect for the photos record store
//!
//! Builds the typed request bodies the backend expects: record type names,
//! filter clauses, desired-key lists and zone identifiers. The protocol
//! caps every query at [`MAX_RECORDS_LIMIT`] records; the cap divides
//! evenly by both per-item fan-out factors (2 for flat fetches, 3 for
//! album-scoped fetches), which keeps the offset arithmetic exact.

use fotosync_core::domain::ZoneReference;
use serde::Serialize;
use serde_json::{json, Value};

/// Hard per-request record cap imposed by the backend.
pub const MAX_RECORDS_LIMIT: usize = 198;

/// Record change tag attached to every mutation.
pub const RECORD_CHANGE_TAG: &str = "21h2";

/// Wire record type identifiers.
pub mod record_types {
    /// Original file record, one per library item
    pub const MASTER: &str = "CPLMaster";
    /// Asset record, one per library item, linked to a master
    pub const ASSET: &str = "CPLAsset";
    /// Album/folder record
    pub const ALBUM: &str = "CPLAlbum";
    /// Container relation record; returned in album scope, never used
    pub const CONTAINER_RELATION: &str = "CPLContainerRelation";
    /// Composite index for the flat "all photos" fetch (2 records per item)
    pub const ALL_PHOTOS: &str = "CPLAssetAndMasterByAssetDateWithoutHiddenOrDeleted";
    /// Composite index for album-scoped fetches (3 records per item)
    pub const ALBUM_PHOTOS: &str = "CPLContainerRelationLiveByPosition";
    /// Albums ordered by position, used for folder traversal
    pub const ALBUMS_BY_POSITION: &str = "CPLAlbumByPositionLive";
    /// Item count lookup
    pub const INDEX_COUNT: &str = "HyperionIndexCountLookup";
    /// Indexing state probe
    pub const INDEXING_STATE: &str = "CheckIndexingState";
}

/// Field keys requested from the backend.
pub const QUERY_KEYS: &[&str] = &[
    "recordName",
    "resOriginalRes",
    "resOriginalFileType",
    "resJPEGFullRes",
    "resJPEGFullFileType",
    "resVidFullRes",
    "resVidFullFileType",
    "filenameEnc",
    "isDeleted",
    "isFavorite",
    "isHidden",
    "masterRef",
    "adjustmentType",
];

/// Zone identifier attached to every query and mutation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ZoneId {
    #[serde(rename = "zoneName")]
    pub zone_name: String,
    #[serde(rename = "zoneType")]
    pub zone_type: String,
    #[serde(rename = "ownerRecordName")]
    pub owner_record_name: String,
}

impl From<&ZoneReference> for ZoneId {
    fn from(zone: &ZoneReference) -> Self {
        Self {
            zone_name: zone.zone_name.clone(),
            zone_type: zone.zone_type.clone(),
            owner_record_name: zone.owner_name.clone(),
        }
    }
}

/// One filter clause of a query.
#[derive(Debug, Clone, Serialize)]
pub struct Filter {
    #[serde(rename = "fieldName")]
    pub field_name: &'static str,
    pub comparator: &'static str,
    #[serde(rename = "fieldValue")]
    pub field_value: FilterValue,
}

/// A typed filter value. The type tag is part of the wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct FilterValue {
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: &'static str,
}

/// Restricts a query to the children of the given parent record.
pub fn parent_filter(parent_id: &str) -> Filter {
    Filter {
        field_name: "parentId",
        comparator: "EQUALS",
        field_value: FilterValue {
            value: json!(parent_id),
            value_type: "STRING",
        },
    }
}

/// Sets the start offset of a paginated query. The rank refers to the
/// logical item tuple, not the wire record.
pub fn start_rank_filter(start_rank: usize) -> Filter {
    Filter {
        field_name: "startRank",
        comparator: "EQUALS",
        field_value: FilterValue {
            value: json!(start_rank),
            value_type: "INT64",
        },
    }
}

/// Fixes the traversal direction of a paginated query.
pub fn direction_filter() -> Filter {
    Filter {
        field_name: "direction",
        comparator: "EQUALS",
        field_value: FilterValue {
            value: json!("ASCENDING"),
            value_type: "STRING",
        },
    }
}

/// Builds the index-count lookup filter; without a parent the count covers
/// the whole library.
pub fn index_count_filter(parent_id: Option<&str>) -> Filter {
    let value = match parent_id {
        Some(parent) => json!([format!("CPLContainerRelationNotDeletedByAssetDate:{parent}")]),
        None => json!(["CPLAssetByAssetDateWithoutHiddenOrDeleted"]),
    };
    Filter {
        field_name: "indexCountID",
        comparator: "IN",
        field_value: FilterValue {
            value,
            value_type: "STRING_LIST",
        },
    }
}

/// The mutation field marking a record as deleted.
pub fn is_deleted_field() -> Value {
    json!({"isDeleted": {"value": 1}})
}

#[cfg(test)]
mod tests {
    use super::*;
    use fotosync_core::domain::ZoneArea;

    #[test]
    fn test_limit_divides_by_both_factors() {
        assert_eq!(MAX_RECORDS_LIMIT % 2, 0);
        assert_eq!(MAX_RECORDS_LIMIT % 3, 0);
    }

    #[test]
    fn test_zone_id_serialization() {
        let zone = ZoneReference {
            zone_name: "PrimarySync".to_string(),
            zone_type: "REGULAR_CUSTOM_ZONE".to_string(),
            owner_name: "_owner".to_string(),
            area: ZoneArea::Primary,
        };
        let value = serde_json::to_value(ZoneId::from(&zone)).unwrap();
        assert_eq!(value["zoneName"], "PrimarySync");
        assert_eq!(value["ownerRecordName"], "_owner");
    }

    #[test]
    fn test_parent_filter_shape() {
        let value = serde_json::to_value(parent_filter("folder-1")).unwrap();
        assert_eq!(value["fieldName"], "parentId");
        assert_eq!(value["comparator"], "EQUALS");
        assert_eq!(value["fieldValue"]["value"], "folder-1");
        assert_eq!(value["fieldValue"]["type"], "STRING");
    }

    #[test]
    fn test_start_rank_filter_is_int64() {
        let value = serde_json::to_value(start_rank_filter(99)).unwrap();
        assert_eq!(value["fieldValue"]["value"], 99);
        assert_eq!(value["fieldValue"]["type"], "INT64");
    }

    #[test]
    fn test_index_count_filter_all_photos() {
        let value = serde_json::to_value(index_count_filter(None)).unwrap();
        assert_eq!(value["fieldName"], "indexCountID");
        assert_eq!(
            value["fieldValue"]["value"][0],
            "CPLAssetByAssetDateWithoutHiddenOrDeleted"
        );
    }

    #[test]
    fn test_index_count_filter_album_scoped() {
        let value = serde_json::to_value(index_count_filter(Some("album-9"))).unwrap();
        assert_eq!(
            value["fieldValue"]["value"][0],
            "CPLContainerRelationNotDeletedByAssetDate:album-9"
        );
    }

    #[test]
    fn test_is_deleted_field() {
        assert_eq!(is_deleted_field()["isDeleted"]["value"], 1);
    }
}
