//! Session context
//!
//! All authentication state is carried in one explicit [`Session`] value that
//! is passed by reference between the auth state machine, the protocol client
//! and the reconciliation engine. Accessors validate required fields before
//! use, so a stale or half-populated session fails fast instead of issuing
//! requests with empty credentials.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ZoneArea, ZoneReference};

/// Session validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Account secrets incomplete: {0}")]
    AccountSecrets(&'static str),

    #[error("Authentication secrets incomplete: {0}")]
    AuthSecrets(&'static str),

    #[error("Account tokens incomplete: {0}")]
    AccountTokens(&'static str),

    #[error("Photos account incomplete: {0}")]
    PhotosAccount(String),
}

/// User-supplied credentials, immutable for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct AccountSecrets {
    pub username: String,
    pub password: String,
}

/// Secrets tracking an in-flight authentication attempt across the MFA step.
///
/// Superseded wholesale on every new sign-in attempt.
#[derive(Debug, Clone, Default)]
pub struct AuthSecrets {
    /// Session identifier returned by the sign-in endpoint
    pub session_id: String,
    /// Continuation token echoed back on every MFA-phase request
    pub scnt: String,
    /// Challenge cookie scoped to this authentication attempt
    pub challenge_cookie: String,
}

/// Long-lived credentials produced by the trust exchange.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountTokens {
    /// Token authenticating the account setup request
    pub session_token: String,
    /// Token allowing future sign-ins to skip MFA; persisted to disk
    pub trust_token: String,
}

/// Everything required to talk to the photos record store.
#[derive(Debug, Clone, Default)]
pub struct PhotosAccount {
    /// Base URL of the record database service for this account
    pub records_url: String,
    /// The account's own zone, present after zone setup
    pub primary: Option<ZoneReference>,
    /// The shared library zone, if the account participates in one
    pub shared: Option<ZoneReference>,
}

/// The complete per-process authentication context.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub secrets: AccountSecrets,
    pub auth: AuthSecrets,
    pub tokens: AccountTokens,
    pub photos: PhotosAccount,
}

impl Session {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            secrets: AccountSecrets {
                username: username.into(),
                password: password.into(),
            },
            ..Default::default()
        }
    }

    pub fn validate_account_secrets(&self) -> Result<(), SessionError> {
        if self.secrets.username.is_empty() {
            return Err(SessionError::AccountSecrets("username empty"));
        }
        if self.secrets.password.is_empty() {
            return Err(SessionError::AccountSecrets("password empty"));
        }
        Ok(())
    }

    pub fn validate_auth_secrets(&self) -> Result<(), SessionError> {
        if self.auth.session_id.is_empty() {
            return Err(SessionError::AuthSecrets("session id empty"));
        }
        if self.auth.scnt.is_empty() {
            return Err(SessionError::AuthSecrets("scnt empty"));
        }
        if self.auth.challenge_cookie.is_empty() {
            return Err(SessionError::AuthSecrets("challenge cookie empty"));
        }
        Ok(())
    }

    pub fn validate_account_tokens(&self) -> Result<(), SessionError> {
        if self.tokens.session_token.is_empty() {
            return Err(SessionError::AccountTokens("session token empty"));
        }
        if self.tokens.trust_token.is_empty() {
            return Err(SessionError::AccountTokens("trust token empty"));
        }
        Ok(())
    }

    /// Validates the photos account. With `area == None` both zones are
    /// required (shared library accounts); otherwise only the given zone.
    pub fn validate_photos_account(&self, area: Option<ZoneArea>) -> Result<(), SessionError> {
        if self.photos.records_url.is_empty() {
            return Err(SessionError::PhotosAccount("records URL empty".to_string()));
        }

        let areas: &[ZoneArea] = match area {
            Some(ZoneArea::Primary) => &[ZoneArea::Primary],
            Some(ZoneArea::Shared) => &[ZoneArea::Shared],
            None => &[ZoneArea::Primary, ZoneArea::Shared],
        };
        for area in areas {
            let zone = self.zone(*area)?;
            zone.validate()
                .map_err(|e| SessionError::PhotosAccount(e.to_string()))?;
        }
        Ok(())
    }

    /// Returns the zone reference for the given area, failing fast when it
    /// has not been acquired.
    pub fn zone(&self, area: ZoneArea) -> Result<&ZoneReference, SessionError> {
        let zone = match area {
            ZoneArea::Primary => self.photos.primary.as_ref(),
            ZoneArea::Shared => self.photos.shared.as_ref(),
        };
        zone.ok_or_else(|| SessionError::PhotosAccount(format!("{area} zone missing")))
    }

    /// True when the account participates in a shared library.
    pub fn shared_library_available(&self) -> bool {
        self.photos.shared.is_some()
    }
}
