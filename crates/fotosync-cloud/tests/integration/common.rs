//! Shared fixtures for the integration tests

use std::sync::Arc;

use fotosync_core::domain::{ZoneArea, ZoneReference};
use fotosync_core::session::Session;
use fotosync_cloud::client::PhotosClient;
use fotosync_cloud::limit::RequestLimiter;
use serde_json::{json, Value};

/// Generous limiter so tests never stall on pacing.
pub fn test_limiter() -> Arc<RequestLimiter> {
    Arc::new(RequestLimiter::new(8, 10_000.0))
}

pub fn test_client() -> PhotosClient {
    PhotosClient::new(reqwest::Client::new(), test_limiter())
}

/// A session that already completed account and zone setup against the
/// given mock server.
pub fn ready_session(records_url: &str) -> Session {
    let mut session = Session::new("user@example.com", "hunter2");
    session.photos.records_url = records_url.to_string();
    session.photos.primary = Some(ZoneReference {
        zone_name: "PrimarySync".to_string(),
        zone_type: "REGULAR_CUSTOM_ZONE".to_string(),
        owner_name: "_owner".to_string(),
        area: ZoneArea::Primary,
    });
    session
}

pub const QUERY_PATH: &str =
    "/database/1/com.apple.photos.cloud/production/private/records/query";
pub const MODIFY_PATH: &str =
    "/database/1/com.apple.photos.cloud/production/private/records/modify";
pub const ZONE_LIST_PATH: &str =
    "/database/1/com.apple.photos.cloud/production/private/zones/list";

/// A master record as returned by the backend.
pub fn master_record(record_name: &str, checksum: &str, filename_b64: &str) -> Value {
    json!({
        "recordName": record_name,
        "recordType": "CPLMaster",
        "fields": {
            "resOriginalRes": {
                "type": "ASSETID",
                "value": {
                    "fileChecksum": checksum,
                    "size": 1000,
                    "wrappingKey": "a2V5",
                    "referenceChecksum": "cmVm",
                    "downloadURL": "https://cdn.example.com/blob"
                }
            },
            "resOriginalFileType": {"value": "public.jpeg", "type": "STRING"},
            "filenameEnc": {"value": filename_b64, "type": "ENCRYPTED_BYTES"}
        },
        "modified": {"timestamp": 1660139199000u64}
    })
}

/// An asset record linked to the given master.
pub fn asset_record(record_name: &str, master_ref: &str) -> Value {
    json!({
        "recordName": record_name,
        "recordType": "CPLAsset",
        "fields": {
            "masterRef": {"value": {"recordName": master_ref}, "type": "REFERENCE"},
            "isFavorite": {"value": 0, "type": "INT64"}
        },
        "modified": {"timestamp": 1660139199000u64}
    })
}

/// An index-count lookup response.
pub fn count_response(count: usize) -> Value {
    json!({
        "records": [{
            "recordName": "count",
            "recordType": "HyperionIndexCountLookup",
            "fields": {"itemCount": {"value": count, "type": "INT64"}}
        }]
    })
}

/// An indexing-state probe response.
pub fn indexing_response(state: &str) -> Value {
    json!({
        "records": [{
            "recordName": "state",
            "recordType": "CheckIndexingState",
            "fields": {"state": {"value": state, "type": "STRING"}}
        }]
    })
}
