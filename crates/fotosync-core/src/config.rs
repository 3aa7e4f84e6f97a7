//! Configuration module for fotosync.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, defaults, and builder-style setters for
//! programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for fotosync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum sync attempts before raising an aggregate error.
    pub max_retries: u32,
    /// Concurrent asset downloads during the write phase.
    pub download_threads: usize,
    /// Seconds to wait for an MFA code before failing the authentication.
    pub mfa_timeout_secs: u64,
    /// Fail immediately when MFA is required (unattended operation).
    pub fail_on_mfa: bool,
    /// Take over a library lock held by another process.
    pub force: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            download_threads: 5,
            mfa_timeout_secs: 600,
            fail_on_mfa: false,
            force: false,
        }
    }
}

/// Backend request throttling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Concurrent outgoing requests across all endpoints.
    pub max_concurrent_requests: usize,
    /// Sustained request pacing, requests per second.
    pub requests_per_second: f64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            requests_per_second: 4.0,
        }
    }
}

/// Authentication storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Directory holding the persisted trust token and library lock.
    pub data_dir: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".fotosync"),
        }
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Path to the log file, empty for stderr only.
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync.max_retries == 0 {
            anyhow::bail!("sync.max_retries must be at least 1");
        }
        if self.sync.download_threads == 0 {
            anyhow::bail!("sync.download_threads must be at least 1");
        }
        if self.rate_limiting.max_concurrent_requests == 0 {
            anyhow::bail!("rate_limiting.max_concurrent_requests must be at least 1");
        }
        if self.rate_limiting.requests_per_second <= 0.0 {
            anyhow::bail!("rate_limiting.requests_per_second must be positive");
        }
        Ok(())
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.sync.max_retries = max_retries;
        self
    }

    pub fn with_download_threads(mut self, threads: usize) -> Self {
        self.sync.download_threads = threads;
        self
    }

    pub fn with_fail_on_mfa(mut self, fail_on_mfa: bool) -> Self {
        self.sync.fail_on_mfa = fail_on_mfa;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.auth.data_dir = dir.into();
        self
    }
}
