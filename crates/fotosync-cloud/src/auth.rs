//! Authentication state machine
//!
//! Drives sign-in, multi-factor verification, trust-token acquisition and
//! account/zone setup. Each phase transition is an explicit state change on
//! [`AuthState`]; the overall readiness is the completion of
//! [`AuthClient::authenticate`], which resolves on `ZonesReady` and fails on
//! any terminal error (including the MFA verification timeout).
//!
//! ## Flow
//!
//! 1. SRP init/complete against the sign-in endpoints, carrying any cached
//!    trust token. A `409` means MFA is required, a `200` means the device
//!    is already trusted.
//! 2. MFA codes and resend requests arrive as [`MfaSignal`]s from the
//!    external transport; the wait is bounded by the configured timeout.
//! 3. The trust exchange persists the trust token to disk *before* the
//!    machine acknowledges the `Trusted` state, so a crash never replays MFA.
//! 4. Account setup yields the records service URL and session cookies;
//!    zone setup acquires zone references and gates on the indexing probe.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use fotosync_core::config::Config;
use fotosync_core::domain::ZoneArea;
use fotosync_core::events::{EventBus, LifecycleEvent};
use fotosync_core::ports::{MfaChannel, MfaReceiver, MfaSignal};
use fotosync_core::session::Session;

use crate::client::PhotosClient;
use crate::error::{AuthError, IndexingError};
use crate::mfa::MfaChannelExt;
use crate::srp::SrpExchange;

/// Default base URL of the authentication service.
const AUTH_BASE: &str = "https://idmsa.apple.com/appleauth/auth";
/// Default base URL of the account setup service.
const SETUP_BASE: &str = "https://setup.icloud.com/setup/ws/1";

/// Client identifier expected by the authentication service.
const AUTH_CLIENT_ID: &str = "d39ba9916b7251055b22c7f910e2ea796ee65e98b2ddecea8f5dde8d9d1a815d";

/// Response header carrying the session token.
const SESSION_TOKEN_HEADER: &str = "X-Apple-Session-Token";
/// Request header carrying the session id during the MFA phase.
const SESSION_ID_HEADER: &str = "X-Apple-ID-Session-Id";
/// Continuation token header, echoed back on every MFA-phase request.
const SCNT_HEADER: &str = "scnt";
/// Response header carrying the trust token.
const TRUST_TOKEN_HEADER: &str = "X-Apple-TwoSV-Trust-Token";
/// Name of the challenge cookie scoped to one authentication attempt.
const CHALLENGE_COOKIE: &str = "aasp";

/// File name of the persisted trust token.
const TRUST_TOKEN_FILE: &str = ".trust-token";

/// Indexing re-check attempts before giving up on a zone.
const INDEXING_RECHECK_ATTEMPTS: u32 = 3;

// ============================================================================
// AuthState
// ============================================================================

/// States of the authentication machine. `Failed` is terminal and reachable
/// from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    Authenticating,
    MfaRequired,
    MfaVerified,
    Trusted,
    AccountReady,
    ZonesReady,
    Failed,
}

impl AuthState {
    /// Enumerates the legal transitions.
    pub fn can_transition_to(self, next: AuthState) -> bool {
        use AuthState::*;
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Authenticating)
                | (Authenticating, MfaRequired)
                | (Authenticating, Trusted)
                | (MfaRequired, MfaVerified)
                | (MfaVerified, Trusted)
                | (Trusted, AccountReady)
                | (AccountReady, ZonesReady)
                // A session refresh re-runs setup from an authenticated state
                | (ZonesReady, AccountReady)
                | (Failed, Authenticating)
        )
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthState::Idle => "IDLE",
            AuthState::Authenticating => "AUTHENTICATING",
            AuthState::MfaRequired => "MFA_REQUIRED",
            AuthState::MfaVerified => "MFA_VERIFIED",
            AuthState::Trusted => "TRUSTED",
            AuthState::AccountReady => "ACCOUNT_READY",
            AuthState::ZonesReady => "ZONES_READY",
            AuthState::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// TrustTokenStore
// ============================================================================

/// On-disk persistence for the trust token.
///
/// Loading happens once at startup; the token is rewritten synchronously
/// after every successful trust exchange.
#[derive(Debug, Clone)]
pub struct TrustTokenStore {
    path: PathBuf,
}

impl TrustTokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TRUST_TOKEN_FILE),
        }
    }

    /// Reads the persisted token, if any.
    pub fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(token) => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    None
                } else {
                    debug!("Loaded trust token from disk");
                    Some(token)
                }
            }
            Err(err) => {
                debug!("No trust token on disk: {err}");
                None
            }
        }
    }

    /// Persists the token, creating the data directory when needed.
    pub fn store(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| AuthError::TrustTokenPersist(err.to_string()))?;
        }
        std::fs::write(&self.path, token)
            .map_err(|err| AuthError::TrustTokenPersist(err.to_string()))
    }

    /// Removes the persisted token (refresh-token flag).
    pub fn clear(&self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            debug!("No trust token to clear: {err}");
        }
    }
}

// ============================================================================
// AuthClient
// ============================================================================

#[derive(Debug, Deserialize)]
struct SigninInitResponse {
    iteration: u32,
    salt: String,
    protocol: crate::srp::SrpProtocol,
    b: String,
    c: String,
}

enum SigninOutcome {
    /// The device is already trusted, MFA can be skipped
    AlreadyTrusted,
    /// The backend demands multi-factor verification
    MfaRequired,
}

/// The authentication state machine.
pub struct AuthClient {
    http: reqwest::Client,
    session: Arc<RwLock<Session>>,
    photos: Arc<PhotosClient>,
    events: EventBus,
    mfa_rx: Option<MfaReceiver>,
    trust_store: TrustTokenStore,
    state: AuthState,
    fail_on_mfa: bool,
    mfa_timeout: Duration,
    indexing_recheck_delay: Duration,
    auth_base: String,
    setup_base: String,
}

impl AuthClient {
    /// Creates a new auth client. The persisted trust token (if any) is
    /// loaded into the session immediately, so the very first sign-in can
    /// already skip MFA.
    pub fn new(
        session: Arc<RwLock<Session>>,
        photos: Arc<PhotosClient>,
        events: EventBus,
        mfa_rx: Option<MfaReceiver>,
        config: &Config,
        http: reqwest::Client,
    ) -> Self {
        let trust_store = TrustTokenStore::new(&config.auth.data_dir);
        if let Some(token) = trust_store.load() {
            if let Ok(mut session) = session.try_write() {
                session.tokens.trust_token = token;
            }
        }

        Self {
            http,
            session,
            photos,
            events,
            mfa_rx,
            trust_store,
            state: AuthState::Idle,
            fail_on_mfa: config.sync.fail_on_mfa,
            mfa_timeout: Duration::from_secs(config.sync.mfa_timeout_secs),
            indexing_recheck_delay: Duration::from_secs(30),
            auth_base: AUTH_BASE.to_string(),
            setup_base: SETUP_BASE.to_string(),
        }
    }

    /// Overrides the service base URLs (integration tests).
    pub fn with_endpoints(
        mut self,
        auth_base: impl Into<String>,
        setup_base: impl Into<String>,
    ) -> Self {
        self.auth_base = auth_base.into();
        self.setup_base = setup_base.into();
        self
    }

    /// Overrides the indexing re-check delay (integration tests).
    pub fn with_indexing_recheck_delay(mut self, delay: Duration) -> Self {
        self.indexing_recheck_delay = delay;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn advance(&mut self, next: AuthState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Auth state transition");
        self.state = next;
    }

    // ========================================================================
    // Overall readiness
    // ========================================================================

    /// Runs the full authentication flow to `ZonesReady`.
    ///
    /// Any failure transitions the machine to `Failed` and surfaces the
    /// specific cause.
    pub async fn authenticate(&mut self) -> Result<(), AuthError> {
        let result = self.authenticate_inner().await;
        if result.is_err() {
            self.state = AuthState::Failed;
        }
        result
    }

    async fn authenticate_inner(&mut self) -> Result<(), AuthError> {
        info!("Authenticating user");
        self.events.emit(LifecycleEvent::AuthenticationStarted);
        self.advance(AuthState::Authenticating);

        self.session.read().await.validate_account_secrets()?;

        match self.signin().await? {
            SigninOutcome::AlreadyTrusted => {
                info!("Device already trusted, skipping MFA");
                self.events.emit(LifecycleEvent::Authenticated);
                self.advance(AuthState::Trusted);
                self.events.emit(LifecycleEvent::Trusted);
            }
            SigninOutcome::MfaRequired => {
                self.events.emit(LifecycleEvent::MfaRequired);
                self.advance(AuthState::MfaRequired);
                if self.fail_on_mfa {
                    return Err(AuthError::MfaRequiredPolicy);
                }
                self.mfa_flow().await?;
                self.advance(AuthState::MfaVerified);
                self.events.emit(LifecycleEvent::Authenticated);
                self.trust_exchange().await?;
                self.advance(AuthState::Trusted);
                self.events.emit(LifecycleEvent::Trusted);
            }
        }

        self.setup().await
    }

    /// Account and zone setup. Also used between sync retries to refresh the
    /// session without repeating the full authentication.
    pub async fn setup(&mut self) -> Result<(), AuthError> {
        self.account_setup().await?;
        self.advance(AuthState::AccountReady);
        self.events.emit(LifecycleEvent::AccountReady);

        self.zone_setup().await?;
        self.advance(AuthState::ZonesReady);
        Ok(())
    }

    // ========================================================================
    // Sign-in (SRP exchange)
    // ========================================================================

    async fn signin(&mut self) -> Result<SigninOutcome, AuthError> {
        let (username, password, trust_token) = {
            let session = self.session.read().await;
            (
                session.secrets.username.clone(),
                session.secrets.password.clone(),
                session.tokens.trust_token.clone(),
            )
        };

        let mut exchange = SrpExchange::new(&username);

        let init: Response = self
            .http
            .post(format!("{}/signin/init", self.auth_base))
            .headers(default_auth_headers())
            .json(&json!({
                "accountName": username,
                "a": exchange.client_ephemeral(),
                "protocols": ["s2k", "s2k_fo"],
            }))
            .send()
            .await?;
        if init.status() != StatusCode::OK {
            return Err(map_auth_status(init.status().as_u16()));
        }
        let init: SigninInitResponse = init
            .json()
            .await
            .map_err(|err| AuthError::MalformedResponse(format!("signin init: {err}")))?;

        let key = SrpExchange::derive_password(init.protocol, &init.salt, init.iteration, &password)?;
        exchange.set_derived_key(key);
        let (m1, m2) = exchange.compute_proof(&init.b, &init.salt)?;

        let complete = self
            .http
            .post(format!("{}/signin/complete", self.auth_base))
            .query(&[("isRememberMeEnabled", "true")])
            .headers(default_auth_headers())
            .json(&json!({
                "accountName": username,
                "m1": m1,
                "m2": m2,
                "c": init.c,
                "rememberMe": true,
                "trustTokens": [trust_token],
            }))
            .send()
            .await?;

        let status = complete.status();
        match status.as_u16() {
            200 => {
                self.process_auth_response(&complete).await?;
                Ok(SigninOutcome::AlreadyTrusted)
            }
            409 => {
                self.process_auth_response(&complete).await?;
                debug!("Acquired auth secrets, MFA required");
                Ok(SigninOutcome::MfaRequired)
            }
            other => Err(map_auth_status(other)),
        }
    }

    /// Extracts the session id, scnt continuation token and challenge cookie
    /// from a sign-in response.
    async fn process_auth_response(&self, response: &Response) -> Result<(), AuthError> {
        let headers = response.headers();
        let session_id = header_string(headers, SESSION_TOKEN_HEADER);
        let scnt = header_string(headers, SCNT_HEADER);
        let challenge_cookie = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookie| {
                cookie
                    .strip_prefix(&format!("{CHALLENGE_COOKIE}="))
                    .map(|rest| rest.split(';').next().unwrap_or(rest).to_string())
            })
            .ok_or_else(|| {
                AuthError::MalformedResponse("no challenge cookie in sign-in response".to_string())
            })?;

        let mut session = self.session.write().await;
        session.auth.session_id = session_id;
        session.tokens.session_token = session.auth.session_id.clone();
        session.auth.scnt = scnt;
        session.auth.challenge_cookie = challenge_cookie;
        session.validate_auth_secrets()?;
        debug!("Auth secrets populated");
        Ok(())
    }

    // ========================================================================
    // MFA
    // ========================================================================

    /// Waits for MFA signals from the external transport, bounded by the
    /// verification timeout. Resend requests are served in-between; the
    /// first received code is submitted and decides the attempt.
    async fn mfa_flow(&mut self) -> Result<(), AuthError> {
        let mut rx = self.mfa_rx.take().ok_or(AuthError::MfaTransportClosed)?;
        let deadline = tokio::time::Instant::now() + self.mfa_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(AuthError::MfaTimeout);
            }

            let signal = match tokio::time::timeout(remaining, rx.recv()).await {
                Err(_) => return Err(AuthError::MfaTimeout),
                Ok(None) => return Err(AuthError::MfaTransportClosed),
                Ok(Some(signal)) => signal,
            };

            match signal {
                MfaSignal::ResendRequested { channel } => {
                    self.resend_mfa(channel).await?;
                }
                MfaSignal::CodeReceived { channel, code } => {
                    self.events.emit(LifecycleEvent::MfaReceived);
                    self.submit_mfa(channel, &code).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Asks the backend to re-send the verification code over the given
    /// channel. A non-conforming response is a warning, not fatal — the
    /// user can simply request another resend.
    async fn resend_mfa(&self, channel: MfaChannel) -> Result<(), AuthError> {
        info!(%channel, "Resending MFA code");
        let url = format!("{}{}", self.auth_base, channel.resend_path());

        let mut request = self
            .http
            .put(&url)
            .headers(self.mfa_headers().await?);
        if let Some(payload) = channel.resend_payload() {
            request = request.json(&payload);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();

        if !channel.resend_successful(status) {
            warn!(%channel, status, "MFA resend returned unexpected status");
            return Ok(());
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        match channel.validate_resend_body(&body) {
            Ok(confirmation) => {
                info!(%channel, "{confirmation}");
                self.events.emit(LifecycleEvent::MfaResent);
            }
            Err(detail) => {
                warn!(%channel, detail, "MFA resend response not verifiable");
            }
        }
        Ok(())
    }

    /// Submits the received code. Any non-success status is fatal for this
    /// authentication attempt.
    async fn submit_mfa(&self, channel: MfaChannel, code: &str) -> Result<(), AuthError> {
        info!(%channel, "Submitting MFA code");
        let url = format!("{}{}", self.auth_base, channel.enter_path());

        let response = self
            .http
            .post(&url)
            .headers(self.mfa_headers().await?)
            .json(&channel.enter_payload(code))
            .send()
            .await?;

        let status = response.status().as_u16();
        if !channel.enter_successful(status) {
            return Err(AuthError::MfaRejected(status));
        }
        info!("MFA code accepted");
        Ok(())
    }

    /// Headers authenticating MFA-phase requests (resend, submit, trust).
    async fn mfa_headers(&self) -> Result<HeaderMap, AuthError> {
        let session = self.session.read().await;
        session.validate_auth_secrets()?;

        let mut headers = default_auth_headers();
        headers.insert(
            SCNT_HEADER,
            HeaderValue::from_str(&session.auth.scnt)
                .map_err(|_| AuthError::MalformedResponse("scnt not header-safe".to_string()))?,
        );
        headers.insert(
            SESSION_ID_HEADER,
            HeaderValue::from_str(&session.auth.session_id).map_err(|_| {
                AuthError::MalformedResponse("session id not header-safe".to_string())
            })?,
        );
        headers.insert(
            reqwest::header::COOKIE,
            HeaderValue::from_str(&format!(
                "{CHALLENGE_COOKIE}={}",
                session.auth.challenge_cookie
            ))
            .map_err(|_| {
                AuthError::MalformedResponse("challenge cookie not header-safe".to_string())
            })?,
        );
        Ok(headers)
    }

    // ========================================================================
    // Trust exchange
    // ========================================================================

    /// Exchanges the verified MFA session for long-lived tokens. The trust
    /// token hits the disk before the state machine acknowledges trust.
    async fn trust_exchange(&mut self) -> Result<(), AuthError> {
        info!("Trusting device and acquiring trust tokens");

        let response = self
            .http
            .get(format!("{}/2sv/trust", self.auth_base))
            .headers(self.mfa_headers().await?)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_auth_status(status.as_u16()));
        }

        let session_token = header_string(response.headers(), SESSION_TOKEN_HEADER);
        let trust_token = header_string(response.headers(), TRUST_TOKEN_HEADER);

        {
            let mut session = self.session.write().await;
            session.tokens.session_token = session_token;
            session.tokens.trust_token = trust_token.clone();
            session.validate_account_tokens()?;
        }

        // Persistence must precede the Trusted acknowledgement
        self.trust_store.store(&trust_token)?;
        debug!("Acquired and persisted account tokens");
        Ok(())
    }

    // ========================================================================
    // Account & zone setup
    // ========================================================================

    async fn account_setup(&mut self) -> Result<(), AuthError> {
        info!("Setting up account");
        let payload = {
            let session = self.session.read().await;
            session.validate_account_tokens()?;
            json!({
                "dsWebAuthToken": session.tokens.session_token,
                "trustToken": session.tokens.trust_token,
            })
        };

        let response = self
            .http
            .post(format!("{}/accountLogin", self.setup_base))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(map_auth_status(status.as_u16()));
        }

        // Session cookies are captured by the shared HTTP client's cookie
        // store; the body only needs to yield the records service URL
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| AuthError::MalformedResponse(format!("account setup: {err}")))?;
        let records_url = body
            .pointer("/webservices/ckdatabasews/url")
            .and_then(serde_json::Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AuthError::MalformedResponse("no records service URL in setup response".to_string())
            })?
            .to_string();

        self.session.write().await.photos.records_url = records_url;
        debug!("Account ready");
        Ok(())
    }

    async fn zone_setup(&mut self) -> Result<(), AuthError> {
        info!("Setting up zones");
        let snapshot = self.session.read().await.clone();
        let (primary, shared) = self
            .photos
            .fetch_zones(&snapshot)
            .await
            .map_err(|err| AuthError::MalformedResponse(format!("zone setup: {err}")))?;

        {
            let mut session = self.session.write().await;
            session.photos.primary = Some(primary);
            session.photos.shared = shared;
        }

        let snapshot = self.session.read().await.clone();
        let mut areas = vec![ZoneArea::Primary];
        if snapshot.shared_library_available() {
            areas.push(ZoneArea::Shared);
        }

        for area in areas {
            self.await_indexing(&snapshot, area).await?;
        }
        info!("All zones report indexing finished");
        Ok(())
    }

    /// Gates on the indexing probe for one zone, backing off and re-checking
    /// while the state is `RUNNING`.
    async fn await_indexing(&self, session: &Session, area: ZoneArea) -> Result<(), AuthError> {
        for attempt in 0..INDEXING_RECHECK_ATTEMPTS {
            match self.photos.check_indexing(session, area).await {
                Ok(()) => {
                    debug!(zone = %area, "Indexing finished");
                    return Ok(());
                }
                Err(IndexingError::InProgress { progress }) => {
                    info!(zone = %area, ?progress, "Indexing in progress, sync needs to wait");
                    self.events
                        .emit(LifecycleEvent::IndexingInProgress { zone: area });
                    if attempt + 1 == INDEXING_RECHECK_ATTEMPTS {
                        return Err(AuthError::IndexingInProgress { zone: area });
                    }
                    tokio::time::sleep(self.indexing_recheck_delay).await;
                }
                Err(err) => return Err(AuthError::Indexing(err)),
            }
        }
        Err(AuthError::IndexingInProgress { zone: area })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn default_auth_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert("X-Apple-Widget-Key", HeaderValue::from_static(AUTH_CLIENT_ID));
    headers
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Maps a sign-in phase status to its specific fatal cause.
fn map_auth_status(status: u16) -> AuthError {
    match status {
        401 => AuthError::Unauthorized,
        403 => AuthError::Forbidden,
        412 => AuthError::PreconditionFailed,
        other => AuthError::UnexpectedStatus(other),
    }
}
