//! Photos record-store client
//!
//! Issues paginated queries and batched mutations against the account's
//! zones. Every outgoing call goes through the shared [`RequestLimiter`];
//! every bulk fetch is preceded by the indexing gate (see
//! [`PhotosClient::check_indexing`]).
//!
//! ## Pagination
//!
//! The backend caps each query at [`MAX_RECORDS_LIMIT`] records. A flat
//! "all photos" fetch returns two wire records per item (master + asset), an
//! album-scoped fetch three (master + asset + container relation), so the
//! fan-out is `ceil(expected * factor / cap)` requests with start offsets of
//! `index * floor(cap / factor)`. Fragments may complete out of order but
//! are concatenated by request index, keeping the final record order
//! deterministic.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context};
use futures::future::join_all;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use fotosync_core::domain::{Asset, SyncWarning, ZoneArea, ZoneReference};
use fotosync_core::session::Session;

use crate::error::{IndexingError, RecordIssue};
use crate::limit::RequestLimiter;
use crate::query::{
    self, direction_filter, index_count_filter, parent_filter, record_types, start_rank_filter,
    Filter, ZoneId, MAX_RECORDS_LIMIT, RECORD_CHANGE_TAG,
};
use crate::records::{
    parse_indexing_state, screen_album_record, screen_picture_record, AlbumRecord, AssetRecord,
    MasterRecord, RawRecord,
};

/// Path prefix of the record database service.
const BASE_PATH: &str = "/database/1/com.apple.photos.cloud/production/private";
/// Zone listing endpoint.
const ZONE_LIST_PATH: &str = "/zones/list";
/// Record query endpoint.
const QUERY_PATH: &str = "/records/query";
/// Record mutation endpoint.
const MODIFY_PATH: &str = "/records/modify";

/// Name of the primary zone as reported by the zone listing.
const PRIMARY_ZONE_NAME: &str = "PrimarySync";
/// Name prefix of shared library zones.
const SHARED_ZONE_PREFIX: &str = "SharedSync-";

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    records: Option<Vec<RawRecord>>,
}

#[derive(Debug, Deserialize)]
struct ZoneListResponse {
    zones: Option<Vec<ZoneEntry>>,
    #[serde(rename = "moreComing", default)]
    more_coming: bool,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    #[serde(rename = "zoneID")]
    zone_id: ZoneEntryId,
}

#[derive(Debug, Deserialize)]
struct ZoneEntryId {
    #[serde(rename = "zoneName")]
    zone_name: String,
    #[serde(rename = "zoneType", default)]
    zone_type: String,
    #[serde(rename = "ownerRecordName", default)]
    owner_record_name: String,
}

/// HTTP client for the photos record store.
///
/// Stateless with respect to the session: every method borrows the
/// [`Session`] so the auth machine and the engine share one source of truth.
pub struct PhotosClient {
    http: reqwest::Client,
    limiter: Arc<RequestLimiter>,
}

impl PhotosClient {
    pub fn new(http: reqwest::Client, limiter: Arc<RequestLimiter>) -> Self {
        Self { http, limiter }
    }

    /// The shared request limiter (settled by the engine between retries).
    pub fn limiter(&self) -> &Arc<RequestLimiter> {
        &self.limiter
    }

    fn service_url(&self, session: &Session, ext: &str) -> anyhow::Result<String> {
        if session.photos.records_url.is_empty() {
            bail!("Records service URL not set, account setup incomplete");
        }
        Ok(format!(
            "{}{}{}",
            session.photos.records_url, BASE_PATH, ext
        ))
    }

    // ========================================================================
    // Queries & mutations
    // ========================================================================

    /// Performs one query against the given zone.
    pub async fn query(
        &self,
        session: &Session,
        area: ZoneArea,
        record_type: &str,
        filters: Vec<Filter>,
        results_limit: Option<usize>,
        desired_keys: Option<&[&str]>,
    ) -> anyhow::Result<Vec<RawRecord>> {
        session.validate_photos_account(Some(area))?;
        let zone = session.zone(area)?;

        let mut body = json!({
            "query": {"recordType": record_type},
            "zoneID": ZoneId::from(zone),
        });
        if !filters.is_empty() {
            body["query"]["filterBy"] = json!(filters);
        }
        if let Some(keys) = desired_keys {
            body["desiredKeys"] = json!(keys);
        }
        if let Some(limit) = results_limit {
            body["resultsLimit"] = json!(limit);
        }

        let url = self.service_url(session, QUERY_PATH)?;
        let _permit = self.limiter.acquire().await;
        debug!(record_type, zone = %zone.zone_name, "Performing query");

        let response = self
            .http
            .post(&url)
            .query(&[("remapEnums", "True")])
            .json(&body)
            .send()
            .await
            .context("Query request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Query for {record_type} returned status {status}");
        }

        let parsed: RecordsResponse = response
            .json()
            .await
            .context("Failed to parse query response")?;
        parsed
            .records
            .ok_or_else(|| anyhow::anyhow!("Query response carried no records array"))
    }

    /// Performs one atomic batched mutation against the given zone.
    pub async fn mutate(
        &self,
        session: &Session,
        area: ZoneArea,
        operation_type: &str,
        fields: serde_json::Value,
        record_names: &[String],
    ) -> anyhow::Result<Vec<RawRecord>> {
        session.validate_photos_account(Some(area))?;
        let zone = session.zone(area)?;

        let operations: Vec<_> = record_names
            .iter()
            .map(|record_name| {
                json!({
                    "operationType": operation_type,
                    "record": {
                        "recordName": record_name,
                        "recordType": record_types::ASSET,
                        "recordChangeTag": RECORD_CHANGE_TAG,
                        "fields": fields,
                    },
                })
            })
            .collect();

        let body = json!({
            "operations": operations,
            "zoneID": ZoneId::from(zone),
            "atomic": true,
        });

        let url = self.service_url(session, MODIFY_PATH)?;
        let _permit = self.limiter.acquire().await;
        debug!(
            operation_type,
            records = record_names.len(),
            "Performing operation"
        );

        let response = self
            .http
            .post(&url)
            .query(&[("remapEnums", "True")])
            .json(&body)
            .send()
            .await
            .context("Operation request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Operation {operation_type} returned status {status}");
        }

        let parsed: RecordsResponse = response
            .json()
            .await
            .context("Failed to parse operation response")?;
        parsed
            .records
            .ok_or_else(|| anyhow::anyhow!("Operation response carried no records array"))
    }

    // ========================================================================
    // Zone setup & indexing gate
    // ========================================================================

    /// Fetches the account's zones: the primary zone plus the shared zone
    /// when the account participates in a shared library.
    pub async fn fetch_zones(
        &self,
        session: &Session,
    ) -> anyhow::Result<(ZoneReference, Option<ZoneReference>)> {
        let url = self.service_url(session, ZONE_LIST_PATH)?;
        let _permit = self.limiter.acquire().await;
        debug!("Fetching zone list");

        let response = self
            .http
            .get(&url)
            .query(&[("getCurrentSyncToken", "True"), ("remapEnums", "True")])
            .send()
            .await
            .context("Zone list request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Zone list returned status {status}");
        }

        let parsed: ZoneListResponse = response
            .json()
            .await
            .context("Failed to parse zone list response")?;
        if parsed.more_coming {
            bail!("Zone list truncated: more zones than one page");
        }
        let zones = parsed
            .zones
            .ok_or_else(|| anyhow::anyhow!("Zone list response carried no zones array"))?;

        info!(count = zones.len(), "Found available zones");

        let primary = zones
            .iter()
            .find(|zone| zone.zone_id.zone_name == PRIMARY_ZONE_NAME)
            .ok_or_else(|| anyhow::anyhow!("No primary zone in zone list"))?;
        let primary = ZoneReference {
            zone_name: primary.zone_id.zone_name.clone(),
            zone_type: primary.zone_id.zone_type.clone(),
            owner_name: primary.zone_id.owner_record_name.clone(),
            area: ZoneArea::Primary,
        };
        primary.validate()?;

        let shared = zones
            .iter()
            .find(|zone| zone.zone_id.zone_name.starts_with(SHARED_ZONE_PREFIX))
            .map(|zone| ZoneReference {
                zone_name: zone.zone_id.zone_name.clone(),
                zone_type: zone.zone_id.zone_type.clone(),
                owner_name: zone.zone_id.owner_record_name.clone(),
                area: ZoneArea::Shared,
            });
        if let Some(ref zone) = shared {
            debug!(zone = %zone.zone_name, "Found shared zone");
            zone.validate()?;
        }

        Ok((primary, shared))
    }

    /// Probes the indexing state of one zone.
    ///
    /// Bulk queries are only safe after indexing completed. `RUNNING` maps to
    /// the retryable [`IndexingError::InProgress`] — callers back off and
    /// re-check rather than abandoning the sync.
    pub async fn check_indexing(
        &self,
        session: &Session,
        area: ZoneArea,
    ) -> Result<(), IndexingError> {
        debug!(zone = %area, "Checking indexing state");
        let records = self
            .query(
                session,
                area,
                record_types::INDEXING_STATE,
                Vec::new(),
                None,
                None,
            )
            .await
            .map_err(|err| {
                warn!(zone = %area, error = %err, "Indexing state probe unavailable");
                IndexingError::Unavailable
            })?;
        parse_indexing_state(&records)
    }

    // ========================================================================
    // Picture records (paginated fan-out)
    // ========================================================================

    /// Looks up the number of items in the library or one album.
    pub async fn picture_count(
        &self,
        session: &Session,
        area: ZoneArea,
        parent_id: Option<&str>,
    ) -> anyhow::Result<usize> {
        let records = self
            .query(
                session,
                area,
                record_types::INDEX_COUNT,
                vec![index_count_filter(parent_id)],
                None,
                None,
            )
            .await
            .context("Index count query failed")?;

        records
            .first()
            .and_then(|record| record.fields.get("itemCount"))
            .and_then(|field| field.get("value"))
            .and_then(|value| {
                value
                    .as_u64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            })
            .map(|count| count as usize)
            .ok_or_else(|| anyhow::anyhow!("Index count response carried no item count"))
    }

    /// Computes the start offsets for the paginated fetch.
    ///
    /// Exactness matters: the constants derive from the wire protocol's
    /// fan-out factor, and any drift produces gaps or duplicate ranges.
    pub fn picture_request_offsets(expected_items: usize, album_scoped: bool) -> Vec<usize> {
        let factor = if album_scoped { 3 } else { 2 };
        let requests = (expected_items * factor).div_ceil(MAX_RECORDS_LIMIT);
        let stride = MAX_RECORDS_LIMIT / factor;
        (0..requests).map(|index| index * stride).collect()
    }

    /// Fetches all picture records for the library (`parent_id == None`) or
    /// one album, fanning out the paginated requests in parallel.
    pub async fn fetch_picture_records(
        &self,
        session: &Session,
        area: ZoneArea,
        parent_id: Option<&str>,
    ) -> anyhow::Result<(Vec<AssetRecord>, Vec<MasterRecord>, Vec<SyncWarning>)> {
        let scope = parent_id.unwrap_or("all photos").to_string();
        debug!(%scope, zone = %area, "Fetching picture records");

        let expected = self
            .picture_count(session, area, parent_id)
            .await
            .with_context(|| format!("Unable to count items for {scope}"))?;

        let offsets = Self::picture_request_offsets(expected, parent_id.is_some());
        debug!(%scope, expected, requests = offsets.len(), "Executing paginated fetch");

        let requests = offsets.iter().map(|offset| {
            let mut filters = vec![start_rank_filter(*offset), direction_filter()];
            let record_type = match parent_id {
                Some(parent) => {
                    filters.push(parent_filter(parent));
                    record_types::ALBUM_PHOTOS
                }
                None => record_types::ALL_PHOTOS,
            };
            self.query(
                session,
                area,
                record_type,
                filters,
                Some(MAX_RECORDS_LIMIT),
                Some(query::QUERY_KEYS),
            )
        });

        // Fragments complete in any order; join_all preserves request order
        let mut all_records = Vec::new();
        for fragment in join_all(requests).await {
            all_records.extend(fragment.with_context(|| format!("Record fetch failed for {scope}"))?);
        }

        let mut warnings = Vec::new();
        let mut masters = Vec::new();
        let mut assets = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for record in &all_records {
            match screen_picture_record(record, &seen) {
                Ok(()) => {}
                Err(issue @ RecordIssue::Ignorable { .. }) => {
                    debug!(record = %record.record_name, %issue, "Dropping record");
                    warnings.push(SyncWarning::RecordDropped {
                        record_name: record.record_name.clone(),
                        reason: issue.to_string(),
                    });
                    continue;
                }
                Err(issue) => return Err(anyhow::Error::new(issue).context("Record screening failed")),
            }

            let parsed = if record.record_type == record_types::MASTER {
                MasterRecord::parse(record).map(|master| masters.push(master))
            } else {
                AssetRecord::parse(record).map(|asset| assets.push(asset))
            };
            match parsed {
                Ok(()) => {
                    seen.insert(record.record_name.clone());
                }
                Err(issue) => {
                    warn!(record = %record.record_name, %issue, "Unable to parse record");
                    warnings.push(SyncWarning::RecordDropped {
                        record_name: record.record_name.clone(),
                        reason: issue.to_string(),
                    });
                }
            }
        }

        // The backend occasionally disagrees with its own count; proceed
        // with whatever was retrieved
        if masters.len() != expected || assets.len() != expected {
            warn!(
                %scope,
                expected,
                masters = masters.len(),
                assets = assets.len(),
                "Record count mismatch"
            );
            warnings.push(SyncWarning::CountMismatch {
                scope,
                expected,
                masters: masters.len(),
                assets: assets.len(),
            });
        }

        Ok((assets, masters, warnings))
    }

    // ========================================================================
    // Album traversal
    // ========================================================================

    /// Fetches all album records, traversing the folder tree from the root.
    ///
    /// Children are only fetched after their parent folder was returned, so
    /// a parent's record always appears at a smaller index than any
    /// descendant's in the flattened result. Hierarchy-aware writes rely on
    /// this ordering.
    pub async fn fetch_album_records(
        &self,
        session: &Session,
    ) -> anyhow::Result<(Vec<AlbumRecord>, Vec<SyncWarning>)> {
        let mut albums = Vec::new();
        let mut warnings = Vec::new();
        let mut queue: Vec<Option<String>> = vec![None];

        while let Some(parent) = queue.pop() {
            let level = self
                .fetch_album_level(session, parent.as_deref())
                .await
                .context("Folder traversal failed")?;

            for record in level {
                match screen_album_record(&record) {
                    Ok(()) => {}
                    Err(issue @ RecordIssue::Ignorable { .. }) => {
                        debug!(record = %record.record_name, %issue, "Dropping album record");
                        warnings.push(SyncWarning::RecordDropped {
                            record_name: record.record_name.clone(),
                            reason: issue.to_string(),
                        });
                        continue;
                    }
                    Err(issue) => {
                        return Err(anyhow::Error::new(issue).context("Album screening failed"))
                    }
                }

                match AlbumRecord::parse(&record) {
                    Ok(album) => {
                        if album.is_folder() {
                            debug!(folder = %album.record_name, "Queueing folder children");
                            queue.push(Some(album.record_name.clone()));
                        }
                        if album.is_folder() || album.is_album() {
                            albums.push(album);
                        } else {
                            warnings.push(SyncWarning::RecordDropped {
                                record_name: album.record_name.clone(),
                                reason: format!("unexpected album kind {}", album.kind),
                            });
                        }
                    }
                    Err(issue) => {
                        warn!(record = %record.record_name, %issue, "Unable to parse album record");
                        warnings.push(SyncWarning::RecordDropped {
                            record_name: record.record_name.clone(),
                            reason: issue.to_string(),
                        });
                    }
                }
            }
        }

        Ok((albums, warnings))
    }

    async fn fetch_album_level(
        &self,
        session: &Session,
        parent_id: Option<&str>,
    ) -> anyhow::Result<Vec<RawRecord>> {
        let filters = match parent_id {
            Some(parent) => vec![parent_filter(parent)],
            None => Vec::new(),
        };
        self.query(
            session,
            ZoneArea::Primary,
            record_types::ALBUMS_BY_POSITION,
            filters,
            None,
            None,
        )
        .await
    }

    // ========================================================================
    // Downloads & deletion
    // ========================================================================

    /// Streams the asset bytes to `target`, then stamps the file's
    /// modification time with the asset's remote modification time.
    pub async fn download_asset(&self, asset: &Asset, target: &Path) -> anyhow::Result<()> {
        let locator = asset
            .locator
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Asset {} has no download locator", asset.checksum))?;

        debug!(asset = %asset.checksum, "Starting asset download");
        let _permit = self.limiter.acquire().await;

        let response = self
            .http
            .get(&locator.download_url)
            .send()
            .await
            .context("Download request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("Download of {} returned status {status}", asset.checksum);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Unable to create asset directory")?;
        }
        let mut file = tokio::fs::File::create(target)
            .await
            .context("Unable to create asset file")?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Download stream interrupted")?;
            file.write_all(&chunk)
                .await
                .context("Unable to write asset chunk")?;
        }
        file.flush().await.context("Unable to flush asset file")?;
        drop(file);

        let mtime = SystemTime::UNIX_EPOCH + Duration::from_millis(asset.modified.max(0) as u64);
        let file = std::fs::File::options()
            .write(true)
            .open(target)
            .context("Unable to reopen asset file")?;
        file.set_modified(mtime)
            .context("Unable to set asset modification time")?;

        debug!(asset = %asset.checksum, "Download completed");
        Ok(())
    }

    /// Marks the given records as deleted in the remote library, as one
    /// atomic batch.
    pub async fn delete_assets(
        &self,
        session: &Session,
        record_names: &[String],
    ) -> anyhow::Result<()> {
        debug!(records = record_names.len(), "Deleting remote assets");
        self.mutate(
            session,
            ZoneArea::Primary,
            "update",
            query::is_deleted_field(),
            record_names,
        )
        .await?;
        Ok(())
    }
}
