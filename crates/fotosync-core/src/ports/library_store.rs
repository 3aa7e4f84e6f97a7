//! Local library port (driven/secondary port)
//!
//! The on-disk materialization of the library (asset directories, album
//! directory/symlink trees, the archived-album stash) is an external
//! collaborator. The engine drives it exclusively through this trait.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::{Album, Asset};

/// Port trait for the local photo library.
#[async_trait::async_trait]
pub trait LibraryStore: Send + Sync {
    /// Loads every asset currently present on disk, keyed by identity.
    async fn load_assets(&self) -> anyhow::Result<HashMap<String, Asset>>;

    /// Loads every album currently present on disk, keyed by identity.
    async fn load_albums(&self) -> anyhow::Result<HashMap<String, Album>>;

    /// The path where the given asset is (or should be) stored.
    fn asset_path(&self, asset: &Asset) -> PathBuf;

    /// Checks whether the asset is already present and matches its remote
    /// metadata (size and modification time).
    async fn verify_asset(&self, asset: &Asset) -> anyhow::Result<bool>;

    /// Removes an asset file from disk.
    async fn delete_asset(&self, asset: &Asset) -> anyhow::Result<()>;

    /// Creates the album's directory structure and asset links.
    async fn write_album(&self, album: &Album) -> anyhow::Result<()>;

    /// Removes an (empty) album from disk.
    async fn delete_album(&self, album: &Album) -> anyhow::Result<()>;

    /// Moves an archived album into the stash, preserving its structure.
    async fn stash_archived_album(&self, album: &Album) -> anyhow::Result<()>;

    /// Restores an archived album from the stash instead of recreating it.
    async fn retrieve_stashed_album(&self, album: &Album) -> anyhow::Result<()>;

    /// Deletes stashed albums that no longer exist remotely.
    async fn clean_archived_orphans(&self, remote_albums: &[Album]) -> anyhow::Result<()>;
}
