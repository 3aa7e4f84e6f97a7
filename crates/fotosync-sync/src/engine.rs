//! Reconciliation engine
//!
//! One sync attempt runs FETCH → DIFF → WRITE; the whole cycle is wrapped
//! in a bounded retry loop that settles the request limiter and refreshes
//! the session between attempts. Per-entity write failures are collected as
//! warnings so the batch completes; phase-level failures feed the retry
//! loop; exhaustion of the attempt bound raises one aggregate error
//! carrying every attempt's cause.

use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use fotosync_core::config::Config;
use fotosync_core::domain::{
    Album, AlbumKind, Asset, ProcessingQueue, RemoteEntity, SyncWarning,
};
use fotosync_core::events::{EventBus, LifecycleEvent};
use fotosync_core::ports::{LibraryStore, RemoteLibrary};

use crate::diff::{processing_queues, resolve_hierarchical_dependencies, sort_queue};
use crate::error::{is_recoverable, RetryLedger, SyncError};
use crate::lock::{LibraryLock, LockError};

/// Result of a completed sync.
///
/// The entity lists reflect the remote state; given a warning-free run they
/// also describe the local state. Warnings document every non-fatal
/// deviation.
#[derive(Debug, Default)]
pub struct SyncResult {
    pub assets: Vec<Asset>,
    pub albums: Vec<Album>,
    pub warnings: Vec<SyncWarning>,
}

/// The photos sync engine.
pub struct SyncEngine {
    remote: Arc<dyn RemoteLibrary>,
    library: Arc<dyn LibraryStore>,
    events: EventBus,
    lock: LibraryLock,
    max_retries: u32,
    download_threads: usize,
    force: bool,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteLibrary>,
        library: Arc<dyn LibraryStore>,
        config: &Config,
        events: EventBus,
    ) -> Self {
        Self {
            remote,
            library,
            events,
            lock: LibraryLock::new(&config.auth.data_dir),
            max_retries: config.sync.max_retries,
            download_threads: config.sync.download_threads,
            force: config.sync.force,
        }
    }

    // ========================================================================
    // Retry loop
    // ========================================================================

    /// Performs the sync, retrying up to the configured bound.
    pub async fn sync(&self) -> Result<SyncResult, SyncError> {
        info!("Starting sync");
        self.events.emit(LifecycleEvent::SyncStarted);

        let _guard = self.lock.acquire(self.force).map_err(|err| match err {
            LockError::Locked { pid } => SyncError::Locked { pid },
            LockError::Io(io) => SyncError::Fatal {
                attempt: 0,
                cause: io.into(),
            },
        })?;

        let mut ledger = RetryLedger::new();
        let mut attempt = 0;
        while attempt < self.max_retries {
            attempt += 1;
            info!(attempt, "Performing sync attempt");

            match self.sync_attempt().await {
                Ok(result) => {
                    info!(
                        assets = result.assets.len(),
                        albums = result.albums.len(),
                        warnings = result.warnings.len(),
                        "Completed sync"
                    );
                    self.events.emit(LifecycleEvent::SyncDone);
                    return Ok(result);
                }
                Err(err) => {
                    if !is_recoverable(&err) {
                        return Err(SyncError::Fatal {
                            attempt,
                            cause: err,
                        });
                    }
                    info!(attempt, error = %format!("{err:#}"), "Recoverable sync error");
                    self.events.emit(LifecycleEvent::SyncRetry { attempt });
                    ledger.record(attempt, err);

                    if attempt == self.max_retries {
                        break;
                    }
                    if let Some(result) = self.prepare_retry().await {
                        return Ok(result);
                    }
                }
            }
        }

        Err(ledger.into_error())
    }

    /// Quiesces the limiter and refreshes the session before the next
    /// attempt. A refresh that cannot reach readiness aborts the sync with
    /// an empty result instead of retrying further.
    async fn prepare_retry(&self) -> Option<SyncResult> {
        debug!("Preparing retry");
        self.remote.settle().await;

        match self.remote.refresh_session().await {
            Ok(()) => None,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Session refresh failed, aborting sync");
                Some(SyncResult {
                    assets: Vec::new(),
                    albums: Vec::new(),
                    warnings: vec![SyncWarning::SessionRefreshFailed {
                        reason: format!("{err:#}"),
                    }],
                })
            }
        }
    }

    // ========================================================================
    // One attempt: fetch → diff → write
    // ========================================================================

    async fn sync_attempt(&self) -> anyhow::Result<SyncResult> {
        // FETCH: four concurrent loads, one barrier
        let (remote_assets, remote_albums, local_assets, local_albums) = tokio::join!(
            self.remote.fetch_assets(),
            self.remote.fetch_albums(),
            self.library.load_assets(),
            self.library.load_albums(),
        );
        let fetched_assets = remote_assets.context("Remote asset fetch failed")?;
        let fetched_albums = remote_albums.context("Remote album fetch failed")?;
        let local_assets = local_assets.context("Local asset load failed")?;
        let local_albums = local_albums.context("Local album load failed")?;

        self.events.emit(LifecycleEvent::FetchCompleted {
            remote_assets: fetched_assets.assets.len(),
            remote_albums: fetched_albums.albums.len(),
            local_assets: local_assets.len(),
            local_albums: local_albums.len(),
        });

        let mut warnings = fetched_assets.warnings.clone();
        warnings.extend(fetched_albums.warnings.clone());

        // DIFF
        let asset_queue = processing_queues(&fetched_assets.assets, &local_assets);
        let album_queue = processing_queues(&fetched_albums.albums, &local_albums);
        let album_queue = resolve_hierarchical_dependencies(album_queue, &local_albums);
        self.events.emit(LifecycleEvent::DiffCompleted);

        // WRITE
        self.write_assets(&asset_queue, &mut warnings).await;
        self.write_albums(album_queue, &fetched_albums.albums, &mut warnings)
            .await?;
        self.events.emit(LifecycleEvent::WriteCompleted);

        Ok(SyncResult {
            assets: fetched_assets.assets,
            albums: fetched_albums.albums,
            warnings,
        })
    }

    // ========================================================================
    // Assets
    // ========================================================================

    /// Applies the asset queue: deletions first (freeing identity
    /// collisions), then downloads, both phases fanned out concurrently.
    /// Individual failures become warnings so the rest of the batch
    /// completes.
    async fn write_assets(&self, queue: &ProcessingQueue<Asset>, warnings: &mut Vec<SyncWarning>) {
        debug!(
            delete = queue.to_delete.len(),
            add = queue.to_add.len(),
            "Writing assets"
        );

        let deletions = queue.to_delete.iter().map(|asset| async move {
            self.library
                .delete_asset(asset)
                .await
                .map_err(|err| (asset.checksum.clone(), err))
        });
        for result in join_all(deletions).await {
            if let Err((identity, err)) = result {
                warn!(asset = %identity, error = %format!("{err:#}"), "Unable to delete asset");
                warnings.push(SyncWarning::AssetWriteFailed {
                    identity,
                    reason: format!("delete failed: {err:#}"),
                });
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.download_threads));
        let additions = queue.to_add.iter().map(|asset| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("download semaphore never closed");
                self.add_asset(asset)
                    .await
                    .map(|_| asset.checksum.clone())
                    .map_err(|err| (asset.checksum.clone(), err))
            }
        });
        for result in join_all(additions).await {
            match result {
                Ok(identity) => {
                    self.events
                        .emit(LifecycleEvent::WriteAssetCompleted { identity });
                }
                Err((identity, err)) => {
                    warn!(asset = %identity, error = %format!("{err:#}"), "Unable to add asset");
                    warnings.push(SyncWarning::AssetWriteFailed {
                        identity,
                        reason: format!("add failed: {err:#}"),
                    });
                }
            }
        }
    }

    /// Downloads one asset unless it is already present and valid.
    async fn add_asset(&self, asset: &Asset) -> anyhow::Result<()> {
        if self
            .library
            .verify_asset(asset)
            .await
            .context("Verification failed")?
        {
            debug!(asset = %asset.checksum, "Asset already downloaded");
            return Ok(());
        }

        let target = self.library.asset_path(asset);
        self.remote
            .download_asset(asset, &target)
            .await
            .context("Download failed")
    }

    // ========================================================================
    // Albums
    // ========================================================================

    /// Applies the album queue: deletions deepest-first, additions
    /// shallowest-first, archived albums through the stash. Afterwards,
    /// stashed albums with no remote counterpart are cleaned up.
    async fn write_albums(
        &self,
        queue: ProcessingQueue<Album>,
        remote_albums: &[Album],
        warnings: &mut Vec<SyncWarning>,
    ) -> anyhow::Result<()> {
        info!(
            delete = queue.to_delete.len(),
            add = queue.to_add.len(),
            "Writing library structure"
        );

        let to_delete = sort_queue(queue.to_delete).map_err(anyhow::Error::new)?;
        let to_add = sort_queue(queue.to_add).map_err(anyhow::Error::new)?;

        // Children must disappear before their now-orphaned parent
        for album in to_delete.iter().rev() {
            self.remove_album(album, warnings).await;
        }
        for album in &to_add {
            self.add_album(album, warnings).await;
        }

        self.library
            .clean_archived_orphans(remote_albums)
            .await
            .context("Stash cleanup failed")?;
        Ok(())
    }

    async fn remove_album(&self, album: &Album, warnings: &mut Vec<SyncWarning>) {
        debug!(album = %album.name, "Removing album");
        let result = if album.kind == AlbumKind::Archived {
            self.library
                .stash_archived_album(album)
                .await
                .map_err(|err| format!("stash failed: {err:#}"))
        } else {
            self.library
                .delete_album(album)
                .await
                .map_err(|err| format!("delete failed: {err:#}"))
        };

        if let Err(reason) = result {
            warn!(album = %album.identity(), %reason, "Unable to remove album");
            warnings.push(SyncWarning::AlbumWriteFailed {
                identity: album.identity().to_string(),
                reason,
            });
        }
    }

    async fn add_album(&self, album: &Album, warnings: &mut Vec<SyncWarning>) {
        debug!(album = %album.name, parent = ?album.parent, "Creating album");
        let result = if album.kind == AlbumKind::Archived {
            self.library
                .retrieve_stashed_album(album)
                .await
                .map_err(|err| format!("retrieve failed: {err:#}"))
        } else {
            self.library
                .write_album(album)
                .await
                .map_err(|err| format!("write failed: {err:#}"))
        };

        match result {
            Ok(()) => {
                self.events.emit(LifecycleEvent::WriteAlbumCompleted {
                    identity: album.identity().to_string(),
                });
            }
            Err(reason) => {
                warn!(album = %album.identity(), %reason, "Unable to add album");
                warnings.push(SyncWarning::AlbumWriteFailed {
                    identity: album.identity().to_string(),
                    reason,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use fotosync_core::domain::ZoneArea;
    use fotosync_core::ports::{FetchedAlbums, FetchedAssets};

    fn asset(checksum: &str) -> Asset {
        Asset {
            checksum: checksum.to_string(),
            size: 100,
            modified: 1_660_000_000_000,
            extension: "jpeg".to_string(),
            kind: fotosync_core::domain::AssetKind::Original,
            orig_filename: format!("IMG_{checksum}"),
            zone: ZoneArea::Primary,
            favorite: false,
            locator: None,
        }
    }

    fn album(uuid: &str, kind: AlbumKind, parent: Option<&str>) -> Album {
        Album::new(uuid, kind, format!("album-{uuid}"), parent.map(str::to_string))
    }

    /// Shared ordered log of side effects across both fakes.
    type Log = Arc<Mutex<Vec<String>>>;

    struct FakeRemote {
        assets: Vec<Asset>,
        albums: Vec<Album>,
        fail_fetches: AtomicU32,
        fail_message: String,
        refresh_fails: bool,
        refresh_calls: AtomicU32,
        settle_calls: AtomicU32,
        fail_download_for: Option<String>,
        log: Log,
    }

    impl FakeRemote {
        fn new(assets: Vec<Asset>, albums: Vec<Album>, log: Log) -> Self {
            Self {
                assets,
                albums,
                fail_fetches: AtomicU32::new(0),
                fail_message: String::new(),
                refresh_fails: false,
                refresh_calls: AtomicU32::new(0),
                settle_calls: AtomicU32::new(0),
                fail_download_for: None,
                log,
            }
        }

        fn failing(mut self, times: u32, message: &str) -> Self {
            self.fail_fetches = AtomicU32::new(times);
            self.fail_message = message.to_string();
            self
        }
    }

    #[async_trait::async_trait]
    impl RemoteLibrary for FakeRemote {
        async fn fetch_assets(&self) -> anyhow::Result<FetchedAssets> {
            let pending = self.fail_fetches.load(Ordering::SeqCst);
            if pending > 0 {
                self.fail_fetches.store(pending - 1, Ordering::SeqCst);
                anyhow::bail!("{}", self.fail_message);
            }
            Ok(FetchedAssets {
                assets: self.assets.clone(),
                warnings: Vec::new(),
            })
        }

        async fn fetch_albums(&self) -> anyhow::Result<FetchedAlbums> {
            Ok(FetchedAlbums {
                albums: self.albums.clone(),
                warnings: Vec::new(),
            })
        }

        async fn download_asset(&self, asset: &Asset, _target: &Path) -> anyhow::Result<()> {
            if self.fail_download_for.as_deref() == Some(asset.checksum.as_str()) {
                anyhow::bail!("download exploded");
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("download:{}", asset.checksum));
            Ok(())
        }

        async fn delete_assets(&self, record_names: &[String]) -> anyhow::Result<()> {
            for name in record_names {
                self.log.lock().unwrap().push(format!("remote-delete:{name}"));
            }
            Ok(())
        }

        async fn refresh_session(&self) -> anyhow::Result<()> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_fails {
                anyhow::bail!("zones never became ready");
            }
            Ok(())
        }

        async fn settle(&self) {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeLibrary {
        assets: HashMap<String, Asset>,
        albums: HashMap<String, Album>,
        log: Log,
    }

    impl FakeLibrary {
        fn new(assets: Vec<Asset>, albums: Vec<Album>, log: Log) -> Self {
            Self {
                assets: assets
                    .into_iter()
                    .map(|a| (a.checksum.clone(), a))
                    .collect(),
                albums: albums.into_iter().map(|a| (a.uuid.clone(), a)).collect(),
                log,
            }
        }
    }

    #[async_trait::async_trait]
    impl LibraryStore for FakeLibrary {
        async fn load_assets(&self) -> anyhow::Result<HashMap<String, Asset>> {
            Ok(self.assets.clone())
        }

        async fn load_albums(&self) -> anyhow::Result<HashMap<String, Album>> {
            Ok(self.albums.clone())
        }

        fn asset_path(&self, asset: &Asset) -> PathBuf {
            PathBuf::from("/library").join(asset.asset_filename())
        }

        async fn verify_asset(&self, asset: &Asset) -> anyhow::Result<bool> {
            Ok(self.assets.contains_key(&asset.checksum))
        }

        async fn delete_asset(&self, asset: &Asset) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("delete-asset:{}", asset.checksum));
            Ok(())
        }

        async fn write_album(&self, album: &Album) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("write-album:{}", album.uuid));
            Ok(())
        }

        async fn delete_album(&self, album: &Album) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("delete-album:{}", album.uuid));
            Ok(())
        }

        async fn stash_archived_album(&self, album: &Album) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("stash:{}", album.uuid));
            Ok(())
        }

        async fn retrieve_stashed_album(&self, album: &Album) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("retrieve:{}", album.uuid));
            Ok(())
        }

        async fn clean_archived_orphans(&self, _remote_albums: &[Album]) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("clean-orphans".to_string());
            Ok(())
        }
    }

    struct Setup {
        engine: SyncEngine,
        remote: Arc<FakeRemote>,
        log: Log,
        _dir: tempfile::TempDir,
    }

    fn setup(remote: FakeRemote, library: FakeLibrary, log: Log) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default()
            .with_data_dir(dir.path())
            .with_download_threads(2);
        let remote = Arc::new(remote);
        let engine = SyncEngine::new(
            remote.clone(),
            Arc::new(library),
            &config,
            EventBus::new(),
        );
        Setup {
            engine,
            remote,
            log,
            _dir: dir,
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_sync_applies_changes_deletions_first() {
        let log = log();
        let remote = FakeRemote::new(vec![asset("new")], vec![], log.clone());
        let library = FakeLibrary::new(vec![asset("stale")], vec![], log.clone());
        let setup = setup(remote, library, log);

        let result = setup.engine.sync().await.unwrap();
        assert_eq!(result.assets.len(), 1);
        assert!(result.warnings.is_empty());

        let entries = setup.log.lock().unwrap().clone();
        let delete_pos = entries.iter().position(|e| e == "delete-asset:stale").unwrap();
        let download_pos = entries.iter().position(|e| e == "download:new").unwrap();
        assert!(delete_pos < download_pos, "deletions must precede additions");
        assert!(entries.contains(&"clean-orphans".to_string()));
    }

    #[tokio::test]
    async fn test_identical_snapshots_are_a_noop() {
        let log = log();
        let shared_assets = vec![asset("same")];
        let shared_albums = vec![album("a1", AlbumKind::Album, None)];
        let remote = FakeRemote::new(shared_assets.clone(), shared_albums.clone(), log.clone());
        let library = FakeLibrary::new(shared_assets, shared_albums, log.clone());
        let setup = setup(remote, library, log);

        let result = setup.engine.sync().await.unwrap();
        assert!(result.warnings.is_empty());

        let entries = setup.log.lock().unwrap().clone();
        assert!(!entries.iter().any(|e| e.starts_with("download:")));
        assert!(!entries.iter().any(|e| e.starts_with("delete-")));
        assert!(!entries.iter().any(|e| e.starts_with("write-album:")));
    }

    #[tokio::test]
    async fn test_retry_bound_makes_exactly_max_attempts() {
        let log = log();
        let remote = FakeRemote::new(vec![], vec![], log.clone())
            .failing(10, "connection reset by peer");
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        let err = setup.engine.sync().await.unwrap_err();
        match err {
            SyncError::MaxRetriesExceeded { attempts } => {
                assert_eq!(attempts.len(), 3);
                assert!(attempts[0].cause.to_string().contains("connection reset"));
            }
            other => panic!("expected MaxRetriesExceeded, got {other}"),
        }
        // Settle/refresh run between attempts, not after the last one
        assert_eq!(setup.remote.settle_calls.load(Ordering::SeqCst), 2);
        assert_eq!(setup.remote.refresh_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let log = log();
        let remote =
            FakeRemote::new(vec![asset("a")], vec![], log.clone()).failing(1, "request failed");
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        let result = setup.engine.sync().await.unwrap();
        assert_eq!(result.assets.len(), 1);
        assert_eq!(setup.remote.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unrecoverable_error_aborts_without_retry() {
        let log = log();
        let remote = FakeRemote::new(vec![], vec![], log.clone())
            .failing(10, "library schema corrupted");
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        let err = setup.engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Fatal { attempt: 1, .. }));
        assert_eq!(setup.remote.settle_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_aborts_with_empty_result() {
        let log = log();
        let mut remote =
            FakeRemote::new(vec![asset("a")], vec![], log.clone()).failing(1, "request failed");
        remote.refresh_fails = true;
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        let result = setup.engine.sync().await.unwrap();
        assert!(result.assets.is_empty());
        assert!(result.albums.is_empty());
        assert!(matches!(
            result.warnings.as_slice(),
            [SyncWarning::SessionRefreshFailed { .. }]
        ));
    }

    #[tokio::test]
    async fn test_per_asset_failure_is_warning_batch_completes() {
        let log = log();
        let mut remote =
            FakeRemote::new(vec![asset("good"), asset("bad")], vec![], log.clone());
        remote.fail_download_for = Some("bad".to_string());
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        let result = setup.engine.sync().await.unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert!(matches!(
            &result.warnings[0],
            SyncWarning::AssetWriteFailed { identity, .. } if identity == "bad"
        ));
        let entries = setup.log.lock().unwrap().clone();
        assert!(entries.contains(&"download:good".to_string()));
    }

    #[tokio::test]
    async fn test_album_writes_follow_hierarchy_order() {
        let log = log();
        let albums = vec![
            album("child", AlbumKind::Album, Some("root")),
            album("root", AlbumKind::Folder, None),
        ];
        let remote = FakeRemote::new(vec![], albums, log.clone());
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        setup.engine.sync().await.unwrap();
        let entries = setup.log.lock().unwrap().clone();
        let root_pos = entries.iter().position(|e| e == "write-album:root").unwrap();
        let child_pos = entries.iter().position(|e| e == "write-album:child").unwrap();
        assert!(root_pos < child_pos);
    }

    #[tokio::test]
    async fn test_moved_archived_album_goes_through_stash() {
        let log = log();
        // Locally: folder with an archived album inside. Remotely: the
        // folder is gone and the album moved to the root.
        let local_albums = vec![
            album("folder", AlbumKind::Folder, None),
            album("archived", AlbumKind::Archived, Some("folder")),
        ];
        let remote_albums = vec![album("archived", AlbumKind::Album, None)];
        let remote = FakeRemote::new(vec![], remote_albums, log.clone());
        let library = FakeLibrary::new(vec![], local_albums, log.clone());
        let setup = setup(remote, library, log);

        setup.engine.sync().await.unwrap();
        let entries = setup.log.lock().unwrap().clone();
        let stash_pos = entries.iter().position(|e| e == "stash:archived").unwrap();
        let retrieve_pos = entries.iter().position(|e| e == "retrieve:archived").unwrap();
        let folder_pos = entries.iter().position(|e| e == "delete-album:folder").unwrap();
        // Children are removed before their parent, and the stash is
        // retrieved rather than the album rebuilt
        assert!(stash_pos < folder_pos);
        assert!(stash_pos < retrieve_pos);
        assert!(!entries.contains(&"write-album:archived".to_string()));
    }

    #[tokio::test]
    async fn test_album_hierarchy_cycle_is_fatal() {
        let log = log();
        let remote_albums = vec![
            album("a", AlbumKind::Album, Some("b")),
            album("b", AlbumKind::Album, Some("a")),
        ];
        let remote = FakeRemote::new(vec![], remote_albums, log.clone());
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        let err = setup.engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Fatal { .. }));
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn test_lock_held_by_live_process_blocks_sync() {
        let log = log();
        let remote = FakeRemote::new(vec![], vec![], log.clone());
        let library = FakeLibrary::new(vec![], vec![], log.clone());
        let setup = setup(remote, library, log);

        // Simulate a foreign live holder
        std::fs::write(setup._dir.path().join(".library.lock"), "1").unwrap();

        let err = setup.engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::Locked { pid: 1 }));
    }
}
