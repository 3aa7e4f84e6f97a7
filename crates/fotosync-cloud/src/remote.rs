//! Remote library adapter
//!
//! Implements the [`RemoteLibrary`] port on top of [`PhotosClient`]: matches
//! master/asset record pairs into domain assets, builds domain albums from
//! the traversal output (fetching each album's member listing on the way),
//! and exposes session refresh and limiter settling to the engine.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use fotosync_core::domain::{
    Album, AlbumKind, Asset, AssetKind, AssetLocator, SyncWarning, ZoneArea,
};
use fotosync_core::ports::{FetchedAlbums, FetchedAssets, RemoteLibrary};
use fotosync_core::session::Session;

use crate::auth::AuthClient;
use crate::client::PhotosClient;
use crate::records::{AssetRecord, MasterRecord};

/// Maps a wire file-type descriptor to a file extension, falling back to the
/// extension of the original filename.
fn extension_for_type(descriptor: &str, fallback: &str) -> String {
    match descriptor {
        "public.jpeg" => "jpeg".to_string(),
        "public.png" => "png".to_string(),
        "public.heic" => "heic".to_string(),
        "public.mpeg-4" => "mp4".to_string(),
        "com.apple.quicktime-movie" => "mov".to_string(),
        _ => fallback.to_string(),
    }
}

/// Splits a decoded original filename into stem and extension.
fn split_filename(filename: &str) -> (String, String) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), ext.to_lowercase()),
        _ => (filename.to_string(), String::new()),
    }
}

/// Matches asset/master record pairs and converts them into domain assets.
///
/// Each pair yields the original version and, when the item was adjusted,
/// an additional edit version. Assets whose master is missing are dropped
/// with a warning; the fetch proceeds with the rest.
pub fn convert_assets(
    asset_records: &[AssetRecord],
    master_records: &[MasterRecord],
    zone: ZoneArea,
) -> (Vec<Asset>, Vec<SyncWarning>) {
    let masters: HashMap<&str, &MasterRecord> = master_records
        .iter()
        .map(|master| (master.record_name.as_str(), master))
        .collect();

    let mut assets = Vec::new();
    let mut warnings = Vec::new();

    for record in asset_records {
        let Some(master) = masters.get(record.master_ref.as_str()) else {
            warn!(asset = %record.record_name, master = %record.master_ref, "No master for asset");
            warnings.push(SyncWarning::RecordDropped {
                record_name: record.record_name.clone(),
                reason: format!("no master record {}", record.master_ref),
            });
            continue;
        };

        let filename = match master.filename() {
            Ok(name) => name,
            Err(issue) => {
                warnings.push(SyncWarning::RecordDropped {
                    record_name: master.record_name.clone(),
                    reason: issue.to_string(),
                });
                continue;
            }
        };
        let (stem, fallback_ext) = split_filename(&filename);

        assets.push(Asset {
            checksum: master.resource.file_checksum.clone(),
            size: master.resource.size,
            modified: master.modified,
            extension: extension_for_type(&master.resource_type, &fallback_ext),
            kind: AssetKind::Original,
            orig_filename: stem.clone(),
            zone,
            favorite: record.favorite,
            locator: Some(AssetLocator {
                download_url: master.resource.download_url.clone(),
                wrapping_key: master.resource.wrapping_key.clone(),
                reference_checksum: master.resource.reference_checksum.clone(),
                record_name: record.record_name.clone(),
            }),
        });

        if let (Some(resource), Some(resource_type)) = (&record.resource, &record.resource_type) {
            assets.push(Asset {
                checksum: resource.file_checksum.clone(),
                size: resource.size,
                modified: record.modified,
                extension: extension_for_type(resource_type, &fallback_ext),
                kind: AssetKind::Edit,
                orig_filename: stem,
                zone,
                favorite: record.favorite,
                locator: Some(AssetLocator {
                    download_url: resource.download_url.clone(),
                    wrapping_key: resource.wrapping_key.clone(),
                    reference_checksum: resource.reference_checksum.clone(),
                    record_name: record.record_name.clone(),
                }),
            });
        }
    }

    (assets, warnings)
}

/// Production implementation of the [`RemoteLibrary`] port.
pub struct CloudLibrary {
    session: Arc<RwLock<Session>>,
    auth: Arc<Mutex<AuthClient>>,
    client: Arc<PhotosClient>,
}

impl CloudLibrary {
    pub fn new(
        session: Arc<RwLock<Session>>,
        auth: Arc<Mutex<AuthClient>>,
        client: Arc<PhotosClient>,
    ) -> Self {
        Self {
            session,
            auth,
            client,
        }
    }

    async fn session_snapshot(&self) -> Session {
        self.session.read().await.clone()
    }
}

#[async_trait::async_trait]
impl RemoteLibrary for CloudLibrary {
    async fn fetch_assets(&self) -> anyhow::Result<FetchedAssets> {
        let session = self.session_snapshot().await;

        let mut result = FetchedAssets::default();
        let mut areas = vec![ZoneArea::Primary];
        if session.shared_library_available() {
            areas.push(ZoneArea::Shared);
        }

        for area in areas {
            let (asset_records, master_records, mut fetch_warnings) = self
                .client
                .fetch_picture_records(&session, area, None)
                .await
                .with_context(|| format!("Asset fetch failed for {area} zone"))?;
            let (assets, mut convert_warnings) =
                convert_assets(&asset_records, &master_records, area);
            debug!(zone = %area, count = assets.len(), "Fetched remote assets");
            result.assets.extend(assets);
            result.warnings.append(&mut fetch_warnings);
            result.warnings.append(&mut convert_warnings);
        }

        Ok(result)
    }

    async fn fetch_albums(&self) -> anyhow::Result<FetchedAlbums> {
        let session = self.session_snapshot().await;
        let (records, mut warnings) = self
            .client
            .fetch_album_records(&session)
            .await
            .context("Album fetch failed")?;

        let mut albums = Vec::with_capacity(records.len());
        for record in records {
            let kind = match AlbumKind::from_wire(record.kind) {
                Ok(kind) => kind,
                Err(err) => {
                    warnings.push(SyncWarning::RecordDropped {
                        record_name: record.record_name.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            let name = match record.name() {
                Ok(name) => name,
                Err(issue) => {
                    warnings.push(SyncWarning::RecordDropped {
                        record_name: record.record_name.clone(),
                        reason: issue.to_string(),
                    });
                    continue;
                }
            };

            let mut album = Album::new(&record.record_name, kind, name, record.parent_id.clone());

            // Only leaf albums carry a member listing
            if kind == AlbumKind::Album {
                let (asset_records, master_records, mut member_warnings) = self
                    .client
                    .fetch_picture_records(&session, ZoneArea::Primary, Some(&record.record_name))
                    .await
                    .with_context(|| {
                        format!("Member fetch failed for album {}", record.record_name)
                    })?;
                warnings.append(&mut member_warnings);

                let (member_assets, mut convert_warnings) =
                    convert_assets(&asset_records, &master_records, ZoneArea::Primary);
                warnings.append(&mut convert_warnings);

                for asset in member_assets {
                    album
                        .assets
                        .insert(asset.asset_filename(), asset.pretty_filename());
                }
            }

            albums.push(album);
        }

        Ok(FetchedAlbums { albums, warnings })
    }

    async fn download_asset(&self, asset: &Asset, target: &Path) -> anyhow::Result<()> {
        self.client.download_asset(asset, target).await
    }

    async fn delete_assets(&self, record_names: &[String]) -> anyhow::Result<()> {
        let session = self.session_snapshot().await;
        self.client.delete_assets(&session, record_names).await
    }

    async fn refresh_session(&self) -> anyhow::Result<()> {
        let mut auth = self.auth.lock().await;
        auth.setup().await.context("Session refresh failed")
    }

    async fn settle(&self) {
        self.client.limiter().settle().await;
    }
}
