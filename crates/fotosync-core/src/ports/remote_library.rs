//! Remote library port (driven/secondary port)
//!
//! The reconciliation engine consumes the remote record store through this
//! trait. The production implementation lives in the cloud adapter crate and
//! wraps the protocol client; tests substitute an in-memory fake.

use std::path::Path;

use crate::domain::{Album, Asset, SyncWarning};

/// Fetch result carrying non-fatal diagnostics alongside the entities.
#[derive(Debug, Clone, Default)]
pub struct FetchedAssets {
    pub assets: Vec<Asset>,
    pub warnings: Vec<SyncWarning>,
}

/// Album fetch result. Albums are ordered root-to-leaf: a folder's index is
/// always smaller than any of its descendants', which hierarchy-aware writes
/// rely on.
#[derive(Debug, Clone, Default)]
pub struct FetchedAlbums {
    pub albums: Vec<Album>,
    pub warnings: Vec<SyncWarning>,
}

/// Port trait for remote record store operations.
#[async_trait::async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Fetches the full remote asset set.
    async fn fetch_assets(&self) -> anyhow::Result<FetchedAssets>;

    /// Fetches the full remote album set in root-to-leaf order.
    async fn fetch_albums(&self) -> anyhow::Result<FetchedAlbums>;

    /// Streams the asset bytes to `target` and stamps the file's modification
    /// time with the asset's remote modification time.
    async fn download_asset(&self, asset: &Asset, target: &Path) -> anyhow::Result<()>;

    /// Marks the given asset records as deleted in the remote library, as one
    /// atomic batch.
    async fn delete_assets(&self, record_names: &[String]) -> anyhow::Result<()>;

    /// Re-establishes account and zone state without repeating the full
    /// authentication (used between retry attempts).
    async fn refresh_session(&self) -> anyhow::Result<()>;

    /// Waits until the shared request limiter has drained all in-flight and
    /// queued work, so a retry starts from a quiet line.
    async fn settle(&self);
}
