//! Album entity
//!
//! Albums and folders form a tree via parent references. The hierarchy is
//! materialized on disk by an external collaborator; the engine only needs
//! the parent relation and the asset mapping to diff and order writes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entity::RemoteEntity;
use super::errors::DomainError;

/// Album kinds as encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlbumKind {
    /// A leaf album holding assets
    Album,
    /// A folder holding other albums/folders
    Folder,
    /// An album that has been archived locally; removal stashes it instead
    /// of deleting, re-addition restores it from the stash
    Archived,
}

impl AlbumKind {
    /// Parses the wire discriminator (`0` album, `3` folder, `99` archived).
    pub fn from_wire(value: i64) -> Result<Self, DomainError> {
        match value {
            0 => Ok(AlbumKind::Album),
            3 => Ok(AlbumKind::Folder),
            99 => Ok(AlbumKind::Archived),
            other => Err(DomainError::UnknownAlbumKind(other)),
        }
    }
}

/// Maps an asset's on-disk filename to its user-facing filename, keeping the
/// album's member listing order-independent and comparable.
pub type AlbumAssets = BTreeMap<String, String>;

/// A domain folder/album
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    /// UUID of this album (the remote record name)
    pub uuid: String,
    /// Album kind
    pub kind: AlbumKind,
    /// Display name
    pub name: String,
    /// UUID of the parent folder, `None` for root-level albums
    pub parent: Option<String>,
    /// Assets contained in this album (empty for folders)
    pub assets: AlbumAssets,
}

impl Album {
    pub fn new(
        uuid: impl Into<String>,
        kind: AlbumKind,
        name: impl Into<String>,
        parent: Option<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            kind,
            name: name.into(),
            parent,
            assets: AlbumAssets::new(),
        }
    }

    /// A filename-safe rendition of the album name.
    pub fn sanitized_filename(&self) -> String {
        self.name.replace('/', "_")
    }

    /// Checks whether `candidate` appears in this album's ancestor chain.
    ///
    /// `full_set` must contain every album that can appear as a parent. The
    /// walk is bounded by the set size, so a cyclic parent graph terminates
    /// instead of recursing forever; cycle detection itself happens during
    /// queue sorting.
    pub fn has_ancestor(&self, candidate: &Album, full_set: &[Album]) -> bool {
        let mut current = self.parent.as_deref();
        let mut hops = 0;
        while let Some(parent_uuid) = current {
            if parent_uuid == candidate.uuid {
                return true;
            }
            hops += 1;
            if hops > full_set.len() {
                return false;
            }
            current = full_set
                .iter()
                .find(|album| album.uuid == parent_uuid)
                .and_then(|album| album.parent.as_deref());
        }
        false
    }
}

impl RemoteEntity for Album {
    fn identity(&self) -> &str {
        &self.uuid
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    /// Equality based on uuid, kind, sanitized name, parent and the set of
    /// member asset filenames. A locally archived album still matches its
    /// remote `Album` counterpart, so archiving does not cause churn.
    fn matches(&self, other: &Self) -> bool {
        let local_archived = other.kind == AlbumKind::Archived;
        let kinds_compatible =
            self.kind == other.kind || (self.kind == AlbumKind::Album && local_archived);
        self.uuid == other.uuid
            && kinds_compatible
            && self.sanitized_filename() == other.sanitized_filename()
            && self.parent == other.parent
            // An archived album's contents are frozen local state
            && (local_archived || self.assets.keys().eq(other.assets.keys()))
    }

    /// A remote album whose local counterpart is archived stays archived:
    /// its removal must stash and its re-addition must unstash.
    fn absorb(mut self, local: Option<&Self>) -> Self {
        if let Some(local) = local {
            if local.kind == AlbumKind::Archived && self.kind == AlbumKind::Album {
                self.kind = AlbumKind::Archived;
                self.assets = local.assets.clone();
            }
        }
        self
    }
}
