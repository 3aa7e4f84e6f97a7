//! Domain module
//!
//! Pure business logic: entities, their identities and equality rules,
//! the processing queue produced by the diff, and domain error types.

pub mod album;
pub mod asset;
pub mod entity;
pub mod errors;
pub mod warnings;
pub mod zone;

pub use album::{Album, AlbumKind};
pub use asset::{Asset, AssetKind, AssetLocator};
pub use entity::{ProcessingQueue, RemoteEntity};
pub use errors::DomainError;
pub use warnings::SyncWarning;
pub use zone::{ZoneArea, ZoneReference};
