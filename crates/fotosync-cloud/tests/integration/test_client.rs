//! Protocol client tests: indexing gate, pagination, mutations

use fotosync_core::domain::{SyncWarning, ZoneArea};
use fotosync_cloud::error::IndexingError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    asset_record, count_response, indexing_response, master_record, ready_session, test_client,
    MODIFY_PATH, QUERY_PATH,
};

#[tokio::test]
async fn test_indexing_gate_finished_proceeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(
            json!({"query": {"recordType": "CheckIndexingState"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(indexing_response("FINISHED")))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    client
        .check_indexing(&session, ZoneArea::Primary)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_indexing_gate_running_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(indexing_response("RUNNING")))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let err = client
        .check_indexing(&session, ZoneArea::Primary)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_indexing_gate_unknown_state_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(indexing_response("MIGRATING")))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let err = client
        .check_indexing(&session, ZoneArea::Primary)
        .await
        .unwrap_err();
    assert_eq!(err, IndexingError::UnknownState("MIGRATING".to_string()));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_indexing_gate_probe_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let err = client
        .check_indexing(&session, ZoneArea::Primary)
        .await
        .unwrap_err();
    assert_eq!(err, IndexingError::Unavailable);
}

#[tokio::test]
async fn test_flat_fetch_parses_master_asset_pairs() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(
            json!({"query": {"recordType": "HyperionIndexCountLookup"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(count_response(2)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({
            "query": {"recordType": "CPLAssetAndMasterByAssetDateWithoutHiddenOrDeleted"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                master_record("m1", "Y2hlY2sx", "SU1HXzEuanBlZw=="),
                asset_record("a1", "m1"),
                master_record("m2", "Y2hlY2sy", "SU1HXzIuanBlZw=="),
                asset_record("a2", "m2"),
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let (assets, masters, warnings) = client
        .fetch_picture_records(&session, ZoneArea::Primary, None)
        .await
        .unwrap();

    assert_eq!(assets.len(), 2);
    assert_eq!(masters.len(), 2);
    assert!(warnings.is_empty());
    assert_eq!(masters[0].record_name, "m1");
    assert_eq!(assets[1].master_ref, "m2");
}

#[tokio::test]
async fn test_fetch_reports_count_mismatch_as_warning() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(
            json!({"query": {"recordType": "HyperionIndexCountLookup"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(count_response(3)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({
            "query": {"recordType": "CPLAssetAndMasterByAssetDateWithoutHiddenOrDeleted"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                master_record("m1", "Y2hlY2sx", "SU1HXzEuanBlZw=="),
                asset_record("a1", "m1"),
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let (assets, masters, warnings) = client
        .fetch_picture_records(&session, ZoneArea::Primary, None)
        .await
        .unwrap();

    // The sync proceeds with what was retrieved
    assert_eq!(assets.len(), 1);
    assert_eq!(masters.len(), 1);
    assert!(warnings
        .iter()
        .any(|w| matches!(w, SyncWarning::CountMismatch { expected: 3, .. })));
}

#[tokio::test]
async fn test_fetch_drops_deleted_and_duplicate_records() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(
            json!({"query": {"recordType": "HyperionIndexCountLookup"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(count_response(1)))
        .mount(&server)
        .await;

    let mut deleted = master_record("gone", "Z29uZQ==", "R09ORS5qcGVn");
    deleted["deleted"] = json!(true);

    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({
            "query": {"recordType": "CPLAssetAndMasterByAssetDateWithoutHiddenOrDeleted"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                deleted,
                master_record("m1", "Y2hlY2sx", "SU1HXzEuanBlZw=="),
                master_record("m1", "Y2hlY2sx", "SU1HXzEuanBlZw=="),
                asset_record("a1", "m1"),
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let (assets, masters, warnings) = client
        .fetch_picture_records(&session, ZoneArea::Primary, None)
        .await
        .unwrap();

    assert_eq!(masters.len(), 1);
    assert_eq!(assets.len(), 1);
    // One deleted, one duplicate
    let dropped = warnings
        .iter()
        .filter(|w| matches!(w, SyncWarning::RecordDropped { .. }))
        .count();
    assert_eq!(dropped, 2);
}

#[tokio::test]
async fn test_album_traversal_orders_parents_first() {
    let server = MockServer::start().await;

    let folder = json!({
        "recordName": "folder-1",
        "recordType": "CPLAlbum",
        "fields": {
            "albumType": {"value": 3, "type": "INT64"},
            "albumNameEnc": {"value": "Rm9sZGVy", "type": "ENCRYPTED_BYTES"}
        },
        "modified": {"timestamp": 1u64}
    });
    let child = json!({
        "recordName": "album-1",
        "recordType": "CPLAlbum",
        "fields": {
            "albumType": {"value": 0, "type": "INT64"},
            "albumNameEnc": {"value": "VHJpcHM=", "type": "ENCRYPTED_BYTES"},
            "parentId": {"value": "folder-1", "type": "STRING"}
        },
        "modified": {"timestamp": 1u64}
    });

    // Folder-scoped query returns the child album. Mounted first: the
    // root-level mock below would also match it.
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({
            "query": {
                "recordType": "CPLAlbumByPositionLive",
                "filterBy": [{"fieldName": "parentId"}]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": [child]})))
        .mount(&server)
        .await;

    // Root level returns the folder only
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(
            json!({"query": {"recordType": "CPLAlbumByPositionLive"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": [folder]})))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let (albums, warnings) = client.fetch_album_records(&session).await.unwrap();

    assert!(warnings.is_empty());
    assert_eq!(albums.len(), 2);
    assert_eq!(albums[0].record_name, "folder-1");
    assert_eq!(albums[1].record_name, "album-1");
    assert_eq!(albums[1].parent_id.as_deref(), Some("folder-1"));
}

#[tokio::test]
async fn test_delete_assets_posts_atomic_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODIFY_PATH))
        .and(body_partial_json(json!({
            "atomic": true,
            "operations": [
                {"operationType": "update", "record": {"recordName": "r1"}},
                {"operationType": "update", "record": {"recordName": "r2"}},
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": [{}, {}]})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    client
        .delete_assets(&session, &["r1".to_string(), "r2".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mutation_without_records_array_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODIFY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = test_client();
    let session = ready_session(&server.uri());
    let err = client
        .delete_assets(&session, &["r1".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no records array"));
}

#[tokio::test]
async fn test_query_rejects_incomplete_session() {
    let client = test_client();
    let session = fotosync_core::session::Session::new("user@example.com", "pw");

    let err = client
        .check_indexing(&session, ZoneArea::Primary)
        .await
        .unwrap_err();
    // Fail-fast on a session that never completed setup
    assert_eq!(err, IndexingError::Unavailable);
}
