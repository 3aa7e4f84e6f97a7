//! Auth state machine tests: full flow, status mapping, MFA policy

use std::sync::Arc;
use std::time::Duration;

use fotosync_core::config::Config;
use fotosync_core::events::EventBus;
use fotosync_core::ports::{mfa_channel, MfaChannel, MfaSignal};
use fotosync_core::session::Session;
use fotosync_cloud::auth::{AuthClient, AuthState};
use fotosync_cloud::client::PhotosClient;
use fotosync_cloud::error::AuthError;
use serde_json::json;
use tokio::sync::RwLock;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{indexing_response, test_limiter, QUERY_PATH, ZONE_LIST_PATH};

fn srp_init_body() -> serde_json::Value {
    use base64::Engine;
    json!({
        "iteration": 20000,
        "salt": base64::engine::general_purpose::STANDARD.encode(b"saltsaltsaltsalt"),
        "protocol": "s2k",
        "b": base64::engine::general_purpose::STANDARD.encode([5u8; 256]),
        "c": "context-token",
    })
}

fn auth_client(
    server: &MockServer,
    config: &Config,
    mfa_rx: Option<fotosync_core::ports::mfa::MfaReceiver>,
) -> (AuthClient, Arc<RwLock<Session>>) {
    let session = Arc::new(RwLock::new(Session::new("user@example.com", "hunter2")));
    let http = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .unwrap();
    let photos = Arc::new(PhotosClient::new(http.clone(), test_limiter()));
    let client = AuthClient::new(
        session.clone(),
        photos,
        EventBus::new(),
        mfa_rx,
        config,
        http,
    )
    .with_endpoints(server.uri(), server.uri())
    .with_indexing_recheck_delay(Duration::from_millis(10));
    (client, session)
}

async fn mount_signin_init(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/signin/init"))
        .and(body_partial_json(json!({"accountName": "user@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(srp_init_body()))
        .mount(server)
        .await;
}

fn signin_response(status: u16) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("X-Apple-Session-Token", "session-token-1")
        .insert_header("scnt", "scnt-1")
        .insert_header("Set-Cookie", "aasp=challenge-cookie-1; Path=/; Secure")
}

async fn mount_post_auth_services(server: &MockServer) {
    // Trust exchange
    Mock::given(method("GET"))
        .and(path("/2sv/trust"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Apple-Session-Token", "session-token-2")
                .insert_header("X-Apple-TwoSV-Trust-Token", "trust-token-1"),
        )
        .mount(server)
        .await;

    // Account setup
    Mock::given(method("POST"))
        .and(path("/accountLogin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webservices": {"ckdatabasews": {"url": server.uri()}}
        })))
        .mount(server)
        .await;

    // Zone setup
    Mock::given(method("GET"))
        .and(path(ZONE_LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "zones": [{
                "zoneID": {
                    "zoneName": "PrimarySync",
                    "zoneType": "REGULAR_CUSTOM_ZONE",
                    "ownerRecordName": "_owner"
                }
            }]
        })))
        .mount(server)
        .await;

    // Indexing gate
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(
            json!({"query": {"recordType": "CheckIndexingState"}}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(indexing_response("FINISHED")))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_authentication_with_mfa() {
    let server = MockServer::start().await;
    mount_signin_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/signin/complete"))
        .respond_with(signin_response(409))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify/trusteddevice/securitycode"))
        .and(body_partial_json(json!({"securityCode": {"code": "123456"}})))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    mount_post_auth_services(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().with_data_dir(dir.path());

    let (tx, rx) = mfa_channel();
    tx.send(MfaSignal::CodeReceived {
        channel: MfaChannel::Device,
        code: "123456".to_string(),
    })
    .await
    .unwrap();

    let (mut client, session) = auth_client(&server, &config, Some(rx));
    client.authenticate().await.unwrap();

    assert_eq!(client.state(), AuthState::ZonesReady);

    let session = session.read().await;
    assert_eq!(session.tokens.trust_token, "trust-token-1");
    assert_eq!(session.photos.records_url, server.uri());
    assert!(session.photos.primary.is_some());
    assert!(session.photos.shared.is_none());

    // The trust token was persisted before trust was acknowledged
    let persisted = std::fs::read_to_string(dir.path().join(".trust-token")).unwrap();
    assert_eq!(persisted, "trust-token-1");
}

#[tokio::test]
async fn test_trusted_device_skips_mfa() {
    let server = MockServer::start().await;
    mount_signin_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/signin/complete"))
        .respond_with(signin_response(200))
        .mount(&server)
        .await;
    mount_post_auth_services(&server).await;

    let dir = tempfile::tempdir().unwrap();
    // Cached trust token from an earlier run
    std::fs::write(dir.path().join(".trust-token"), "cached-trust").unwrap();
    let config = Config::default().with_data_dir(dir.path());

    let (mut client, session) = auth_client(&server, &config, None);
    client.authenticate().await.unwrap();

    assert_eq!(client.state(), AuthState::ZonesReady);
    // No MFA, no trust exchange: the cached token stays in place
    assert_eq!(session.read().await.tokens.trust_token, "cached-trust");
}

#[tokio::test]
async fn test_unauthorized_maps_to_specific_cause() {
    let server = MockServer::start().await;
    mount_signin_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/signin/complete"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().with_data_dir(dir.path());
    let (mut client, _session) = auth_client(&server, &config, None);

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized));
    assert_eq!(client.state(), AuthState::Failed);
}

#[tokio::test]
async fn test_unexpected_status_maps_to_specific_cause() {
    let server = MockServer::start().await;
    mount_signin_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/signin/complete"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().with_data_dir(dir.path());
    let (mut client, _session) = auth_client(&server, &config, None);

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::UnexpectedStatus(503)));
}

#[tokio::test]
async fn test_fail_on_mfa_policy() {
    let server = MockServer::start().await;
    mount_signin_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/signin/complete"))
        .respond_with(signin_response(409))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config::default()
        .with_data_dir(dir.path())
        .with_fail_on_mfa(true);
    let (mut client, _session) = auth_client(&server, &config, None);

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MfaRequiredPolicy));
    assert_eq!(client.state(), AuthState::Failed);
}

#[tokio::test]
async fn test_rejected_mfa_code_is_fatal() {
    let server = MockServer::start().await;
    mount_signin_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/signin/complete"))
        .respond_with(signin_response(409))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/verify/trusteddevice/securitycode"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().with_data_dir(dir.path());

    let (tx, rx) = mfa_channel();
    tx.send(MfaSignal::CodeReceived {
        channel: MfaChannel::Device,
        code: "000000".to_string(),
    })
    .await
    .unwrap();

    let (mut client, _session) = auth_client(&server, &config, Some(rx));
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MfaRejected(400)));
}

#[tokio::test]
async fn test_mfa_wait_is_time_bounded() {
    let server = MockServer::start().await;
    mount_signin_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/signin/complete"))
        .respond_with(signin_response(409))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default().with_data_dir(dir.path());
    config.sync.mfa_timeout_secs = 0;

    // A transport that never delivers a code
    let (_tx, rx) = mfa_channel();
    let (mut client, _session) = auth_client(&server, &config, Some(rx));

    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, AuthError::MfaTimeout));
}

#[tokio::test]
async fn test_setup_without_tokens_fails_fast() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().with_data_dir(dir.path());
    let (mut client, _session) = auth_client(&server, &config, None);

    // Refresh requires an authenticated session
    let err = client.setup().await.unwrap_err();
    assert!(matches!(err, AuthError::Session(_)));
}
