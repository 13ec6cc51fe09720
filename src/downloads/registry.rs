use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::hls;
use super::record::{DownloadRecord, DownloadStatus, derived_id, media_extension};
use super::transfer::{self, TransferOutcome};
use crate::config::DownloadConfig;
use crate::constants::{PAUSE_POLL_INTERVAL_MS, REGISTRY_STORE_KEY};
use crate::errors::DownloadError;
use crate::events::{NotificationKind, NotificationSubscriber, ObserverHub, ProgressUpdate};
use crate::fs::FileSystem;
use crate::models::{ContentKind, ContentMetadata, DownloadId, QualityTier};
use crate::store::KeyValueStore;

/// On-demand aggregate over the download collection. Computed fresh on
/// every call, never cached.
#[derive(Debug, Clone, Copy)]
pub struct StorageSummary {
    pub total_records: usize,
    pub completed_records: usize,
    pub completed_bytes: u64,
    pub free_bytes: u64,
}

/// What a transfer engine should do next with its download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferGate {
    Continue,
    Stop,
}

struct ActiveTransfer {
    generation: u64,
    token: CancellationToken,
}

struct RegistryInner {
    config: DownloadConfig,
    store: Arc<dyn KeyValueStore>,
    fs: Arc<dyn FileSystem>,
    hub: ObserverHub,
    client: Client,
    records: RwLock<HashMap<DownloadId, DownloadRecord>>,
    active: RwLock<HashMap<DownloadId, ActiveTransfer>>,
    transfer_slots: Arc<Semaphore>,
    next_generation: AtomicU64,
}

/// Single authority over download state.
///
/// Owns the in-memory record map, mediates every status transition, and
/// writes the full collection back to the injected store after each
/// mutation. Constructed once at startup and handed to callers by clone;
/// clones share the same underlying state.
#[derive(Clone)]
pub struct DownloadRegistry {
    inner: Arc<RegistryInner>,
}

impl DownloadRegistry {
    /// Create the registry, restoring any persisted download records.
    ///
    /// Records that were mid-transfer when the process last died come back
    /// as `paused`; no task exists for them anymore, so resuming restarts
    /// the transfer.
    pub async fn new(
        config: DownloadConfig,
        store: Arc<dyn KeyValueStore>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DownloadError::Network(format!("Failed to build HTTP client: {e}")))?;

        let download_dir = config
            .download_directory()
            .map_err(|e| DownloadError::Storage(format!("{e:#}")))?;
        fs.mkdir_all(&download_dir).await?;

        let mut records: HashMap<DownloadId, DownloadRecord> = HashMap::new();
        match store.get(REGISTRY_STORE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<DownloadRecord>>(&raw) {
                Ok(list) => {
                    for mut record in list {
                        if matches!(
                            record.status,
                            DownloadStatus::Pending | DownloadStatus::Downloading
                        ) {
                            record.status = DownloadStatus::Paused;
                            record.touch();
                        }
                        records.insert(record.id.clone(), record);
                    }
                }
                Err(e) => warn!("Discarding unreadable download registry snapshot: {e}"),
            },
            Ok(None) => {}
            Err(e) => {
                return Err(DownloadError::Storage(format!(
                    "Failed to load download registry: {e:#}"
                )));
            }
        }
        info!("Restored {} download records", records.len());

        let slots = config.max_concurrent_downloads.max(1) as usize;
        let hub = ObserverHub::new(config.notification_buffer);

        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                store,
                fs,
                hub,
                client,
                records: RwLock::new(records),
                active: RwLock::new(HashMap::new()),
                transfer_slots: Arc::new(Semaphore::new(slots)),
                next_generation: AtomicU64::new(0),
            }),
        })
    }

    // ----- public CRUD surface -------------------------------------------

    /// Register a new download and kick off its transfer.
    ///
    /// The id is derived deterministically from the content; starting the
    /// same content again fails while a record is active and once one has
    /// completed. Failed or cancelled records are replaced.
    pub async fn start_download(
        &self,
        content: &ContentMetadata,
        media_url: &str,
        quality: QualityTier,
        season: Option<u32>,
        episode: Option<u32>,
        episode_title: Option<String>,
    ) -> Result<DownloadId, DownloadError> {
        let id = derived_id(content.id, content.kind, season, episode);
        let is_hls = hls::is_hls_url(media_url);

        let download_dir = self
            .inner
            .config
            .download_directory()
            .map_err(|e| DownloadError::Storage(format!("{e:#}")))?;
        self.inner.fs.mkdir_all(&download_dir).await?;
        let extension = media_extension(media_url, is_hls);
        let file_path = download_dir.join(format!("{}_{}.{extension}", id, quality.as_str()));

        let record = DownloadRecord::new(
            id.clone(),
            content,
            media_url,
            quality,
            season,
            episode,
            episode_title,
            file_path.clone(),
        );
        let title = record.display_title();

        self.mutate(|records| {
            if let Some(existing) = records.get(&id) {
                match existing.status {
                    DownloadStatus::Pending
                    | DownloadStatus::Downloading
                    | DownloadStatus::Paused => {
                        return Err(DownloadError::AlreadyDownloading(id.to_string()));
                    }
                    DownloadStatus::Completed => {
                        return Err(DownloadError::AlreadyCompleted(id.to_string()));
                    }
                    DownloadStatus::Failed | DownloadStatus::Cancelled => {
                        debug!(
                            "Replacing {} record for {id}",
                            existing.status.as_str()
                        );
                    }
                }
            }
            records.insert(id.clone(), record);
            Ok(())
        })
        .await?;

        info!(
            "🔄 Download started for {id} ({})",
            if is_hls { "hls" } else { "direct" }
        );
        self.inner
            .hub
            .notify(&id, title, "Download started", NotificationKind::Info);

        self.spawn_transfer(id.clone(), media_url.to_string(), file_path, is_hls)
            .await;

        Ok(id)
    }

    /// Pause an actively downloading record. The transfer task stays alive
    /// and waits, so a later resume continues where it stopped.
    pub async fn pause_download(&self, id: &DownloadId) -> Result<(), DownloadError> {
        let title = self
            .mutate(|records| {
                let record = records
                    .get_mut(id)
                    .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
                if record.status != DownloadStatus::Downloading {
                    return Err(DownloadError::InvalidState(format!(
                        "Cannot pause {id} while {}",
                        record.status.as_str()
                    )));
                }
                apply_transition(record, DownloadStatus::Paused)?;
                Ok(record.display_title())
            })
            .await?;

        info!("Download paused for {id}");
        self.inner
            .hub
            .notify(id, title, "Download paused", NotificationKind::Info);
        Ok(())
    }

    /// Resume a paused record. If its transfer task is still alive it
    /// continues in place; otherwise the transfer restarts from scratch.
    pub async fn resume_download(&self, id: &DownloadId) -> Result<(), DownloadError> {
        let live = self.inner.active.read().await.contains_key(id);

        if live {
            let title = self
                .mutate(|records| {
                    let record = records
                        .get_mut(id)
                        .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
                    if record.status != DownloadStatus::Paused {
                        return Err(DownloadError::NotPaused(id.to_string()));
                    }
                    apply_transition(record, DownloadStatus::Downloading)?;
                    Ok(record.display_title())
                })
                .await?;

            info!("Download resumed for {id}");
            self.inner
                .hub
                .notify(id, title, "Download resumed", NotificationKind::Info);
        } else {
            let (title, media_url, file_path) = self
                .mutate(|records| {
                    let record = records
                        .get_mut(id)
                        .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
                    if record.status != DownloadStatus::Paused {
                        return Err(DownloadError::NotPaused(id.to_string()));
                    }
                    apply_transition(record, DownloadStatus::Pending)?;
                    // The old transfer is gone; its byte counts are stale
                    record.progress = 0.0;
                    record.downloaded_bytes = 0;
                    record.transfer_rate_bps = 0;
                    record.eta_seconds = None;
                    Ok((
                        record.display_title(),
                        record.media_url.clone(),
                        record.file_path.clone(),
                    ))
                })
                .await?;

            info!("Download restarting for {id}");
            self.inner
                .hub
                .notify(id, title, "Download resumed", NotificationKind::Info);

            let is_hls = hls::is_hls_url(&media_url);
            self.spawn_transfer(id.clone(), media_url, file_path, is_hls)
                .await;
        }

        Ok(())
    }

    /// Cancel a non-terminal download and remove its partial data.
    pub async fn cancel_download(&self, id: &DownloadId) -> Result<(), DownloadError> {
        if let Some(active) = self.inner.active.read().await.get(id) {
            active.token.cancel();
        }

        let (title, file_path) = self
            .mutate(|records| {
                let record = records
                    .get_mut(id)
                    .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
                if record.status.is_terminal() {
                    return Err(DownloadError::InvalidState(format!(
                        "Cannot cancel {id} in state {}",
                        record.status.as_str()
                    )));
                }
                apply_transition(record, DownloadStatus::Cancelled)?;
                record.transfer_rate_bps = 0;
                record.eta_seconds = None;
                Ok((record.display_title(), record.file_path.clone()))
            })
            .await?;

        self.remove_partial_data(id, &file_path).await;
        self.inner.hub.drop_progress(id).await;

        info!("Download cancelled for {id}");
        self.inner
            .hub
            .notify(id, title, "Download cancelled", NotificationKind::Info);
        Ok(())
    }

    /// Remove a record entirely along with every file it references.
    pub async fn delete_download(&self, id: &DownloadId) -> Result<(), DownloadError> {
        if let Some(active) = self.inner.active.read().await.get(id) {
            active.token.cancel();
        }

        let record = self
            .mutate(|records| {
                records
                    .remove(id)
                    .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))
            })
            .await?;

        for subtitle in &record.subtitle_paths {
            if let Err(e) = self.inner.fs.unlink(subtitle).await {
                warn!("Failed to remove subtitle file {subtitle:?}: {e:#}");
            }
        }
        if let Some(thumbnail) = &record.thumbnail_path {
            if let Err(e) = self.inner.fs.unlink(thumbnail).await {
                warn!("Failed to remove thumbnail {thumbnail:?}: {e:#}");
            }
        }
        self.remove_partial_data(id, &record.file_path).await;
        self.inner.hub.drop_progress(id).await;

        info!("Download deleted for {id}");
        self.inner.hub.notify(
            id,
            record.display_title(),
            "Download deleted",
            NotificationKind::Info,
        );
        Ok(())
    }

    /// All records, most recently created first.
    pub async fn get_all_downloads(&self) -> Vec<DownloadRecord> {
        let records = self.inner.records.read().await;
        let mut all: Vec<DownloadRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub async fn get_download(&self, id: &DownloadId) -> Option<DownloadRecord> {
        self.inner.records.read().await.get(id).cloned()
    }

    pub async fn get_downloads_by_status(&self, status: DownloadStatus) -> Vec<DownloadRecord> {
        let records = self.inner.records.read().await;
        let mut matching: Vec<DownloadRecord> = records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
    }

    /// True iff the derived record exists and has completed.
    pub async fn is_content_downloaded(
        &self,
        content_id: u64,
        kind: ContentKind,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> bool {
        let id = derived_id(content_id, kind, season, episode);
        self.inner
            .records
            .read()
            .await
            .get(&id)
            .map(|r| r.status == DownloadStatus::Completed)
            .unwrap_or(false)
    }

    /// Local path of completed content, if present.
    pub async fn get_downloaded_content_path(
        &self,
        content_id: u64,
        kind: ContentKind,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Option<PathBuf> {
        let id = derived_id(content_id, kind, season, episode);
        let records = self.inner.records.read().await;
        records
            .get(&id)
            .filter(|r| r.status == DownloadStatus::Completed)
            .map(|r| r.file_path.clone())
    }

    /// Delete every failed or cancelled record, returning how many were
    /// removed.
    pub async fn cleanup_failed_downloads(&self) -> Result<usize, DownloadError> {
        let ids: Vec<DownloadId> = {
            let records = self.inner.records.read().await;
            records
                .values()
                .filter(|r| {
                    matches!(r.status, DownloadStatus::Failed | DownloadStatus::Cancelled)
                })
                .map(|r| r.id.clone())
                .collect()
        };

        let mut removed = 0;
        for id in ids {
            match self.delete_download(&id).await {
                Ok(()) => removed += 1,
                Err(DownloadError::DownloadNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Aggregate view over the collection plus volume free space.
    pub async fn storage_summary(&self) -> Result<StorageSummary, DownloadError> {
        let (total_records, completed_records, completed_bytes) = {
            let records = self.inner.records.read().await;
            let completed: Vec<&DownloadRecord> = records
                .values()
                .filter(|r| r.status == DownloadStatus::Completed)
                .collect();
            let bytes = completed.iter().map(|r| r.total_bytes).sum();
            (records.len(), completed.len(), bytes)
        };

        let download_dir = self
            .inner
            .config
            .download_directory()
            .map_err(|e| DownloadError::Storage(format!("{e:#}")))?;
        let free_bytes = self.inner.fs.free_space(&download_dir).await?;

        Ok(StorageSummary {
            total_records,
            completed_records,
            completed_bytes,
            free_bytes,
        })
    }

    // ----- observer surface ----------------------------------------------

    /// Subscribe to lifecycle notifications for all downloads.
    pub fn notifications(&self) -> NotificationSubscriber {
        self.inner.hub.subscribe_notifications()
    }

    /// Subscribe to progress updates for one download. Dropping the
    /// receiver unsubscribes.
    pub async fn progress_updates(&self, id: &DownloadId) -> watch::Receiver<ProgressUpdate> {
        self.inner.hub.subscribe_progress(id).await
    }

    // ----- transfer-engine interface -------------------------------------

    pub(crate) fn client(&self) -> &Client {
        &self.inner.client
    }

    pub(crate) fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.inner.fs
    }

    pub(crate) fn config(&self) -> &DownloadConfig {
        &self.inner.config
    }

    /// Poll point for transfer engines between chunks and segments.
    ///
    /// Waits while the download is paused; reports `Stop` once the record
    /// is cancelled, deleted, or its cancellation token fires.
    pub(crate) async fn transfer_gate(
        &self,
        id: &DownloadId,
        token: &CancellationToken,
    ) -> TransferGate {
        loop {
            if token.is_cancelled() {
                return TransferGate::Stop;
            }
            let status = self.inner.records.read().await.get(id).map(|r| r.status);
            match status {
                Some(DownloadStatus::Paused) => {
                    tokio::time::sleep(Duration::from_millis(PAUSE_POLL_INTERVAL_MS)).await;
                }
                Some(DownloadStatus::Pending) | Some(DownloadStatus::Downloading) => {
                    return TransferGate::Continue;
                }
                _ => return TransferGate::Stop,
            }
        }
    }

    /// Move a record into `downloading` when its transfer actually begins.
    pub(crate) async fn mark_downloading(&self, id: &DownloadId) -> Result<(), DownloadError> {
        self.mutate(|records| {
            let record = records
                .get_mut(id)
                .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
            if record.status == DownloadStatus::Downloading {
                return Ok(());
            }
            apply_transition(record, DownloadStatus::Downloading)
        })
        .await
    }

    /// Fold a progress sample into the record and forward it to observers.
    /// Progress never moves backwards within a transfer.
    pub(crate) async fn report_progress(&self, id: &DownloadId, mut sample: ProgressUpdate) {
        sample.id = id.clone();
        let applied = self
            .mutate(|records| {
                let record = records
                    .get_mut(id)
                    .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
                if record.status != DownloadStatus::Downloading {
                    return Err(DownloadError::InvalidState(format!(
                        "Download {id} is {}",
                        record.status.as_str()
                    )));
                }
                sample.progress = sample.progress.clamp(0.0, 100.0).max(record.progress);
                record.progress = sample.progress;
                record.downloaded_bytes = sample.downloaded_bytes;
                if sample.total_bytes > 0 {
                    record.total_bytes = sample.total_bytes;
                } else {
                    sample.total_bytes = record.total_bytes;
                }
                record.transfer_rate_bps = sample.rate_bps;
                record.eta_seconds = sample.eta_seconds;
                record.touch();
                Ok(())
            })
            .await;

        match applied {
            Ok(()) => self.inner.hub.publish_progress(sample).await,
            Err(e) => debug!("Dropping progress update for {id}: {e}"),
        }
    }

    // ----- internals ------------------------------------------------------

    /// Mutate the record map and persist the full collection before
    /// returning. A closure error leaves both memory and store untouched.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut HashMap<DownloadId, DownloadRecord>) -> Result<T, DownloadError>,
    ) -> Result<T, DownloadError> {
        let mut records = self.inner.records.write().await;
        let value = f(&mut records)?;

        let mut snapshot: Vec<&DownloadRecord> = records.values().collect();
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let raw = serde_json::to_string(&snapshot)?;
        self.inner
            .store
            .set(REGISTRY_STORE_KEY, &raw)
            .await
            .map_err(|e| {
                DownloadError::Storage(format!("Failed to persist download registry: {e:#}"))
            })?;

        Ok(value)
    }

    async fn spawn_transfer(
        &self,
        id: DownloadId,
        media_url: String,
        destination: PathBuf,
        is_hls: bool,
    ) {
        let token = CancellationToken::new();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner.active.write().await.insert(
            id.clone(),
            ActiveTransfer {
                generation,
                token: token.clone(),
            },
        );

        let registry = self.clone();
        tokio::spawn(async move {
            let Ok(permit) = registry.inner.transfer_slots.clone().acquire_owned().await
            else {
                return;
            };

            let result = if is_hls {
                hls::run_hls_transfer(&registry, &id, &media_url, &destination, &token).await
            } else {
                transfer::run_file_transfer(&registry, &id, &media_url, &destination, &token)
                    .await
            };
            drop(permit);

            let stopped = matches!(result, Ok(TransferOutcome::Cancelled));
            registry
                .conclude_transfer(&id, &destination, is_hls, result)
                .await;

            let still_current = {
                let mut active = registry.inner.active.write().await;
                if active.get(&id).map(|a| a.generation) == Some(generation) {
                    active.remove(&id);
                    true
                } else {
                    false
                }
            };
            // Bytes that landed between the cancel's cleanup and the task
            // actually stopping would otherwise linger until the next
            // operation touches this id.
            if stopped && still_current {
                registry.remove_partial_data(&id, &destination).await;
            }
        });
    }

    async fn conclude_transfer(
        &self,
        id: &DownloadId,
        destination: &Path,
        is_hls: bool,
        result: Result<TransferOutcome, DownloadError>,
    ) {
        match result {
            Ok(TransferOutcome::Completed) => self.finalize_completed(id, destination).await,
            Ok(TransferOutcome::Cancelled) => debug!("Transfer task for {id} stopped"),
            Err(e) => self.fail_download(id, is_hls, destination, e).await,
        }
    }

    async fn finalize_completed(&self, id: &DownloadId, destination: &Path) {
        let Some(poster_path) = self
            .inner
            .records
            .read()
            .await
            .get(id)
            .map(|r| r.poster_path.clone())
        else {
            warn!("Record for {id} vanished before finalization, removing orphan file");
            let _ = self.inner.fs.unlink(destination).await;
            return;
        };

        // Best-effort extras; never fail a finished download over them
        let thumbnail_path = match &poster_path {
            Some(poster) => self.fetch_thumbnail(id, poster).await,
            None => None,
        };
        let subtitle_path = self.write_subtitle_placeholder(destination).await;

        let file_size = self
            .inner
            .fs
            .stat(destination)
            .await
            .map(|s| s.size)
            .unwrap_or(0);

        let finalized = self
            .mutate(|records| {
                let record = records
                    .get_mut(id)
                    .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
                apply_transition(record, DownloadStatus::Completed)?;
                record.progress = 100.0;
                record.downloaded_bytes = record.downloaded_bytes.max(file_size);
                record.total_bytes = record.total_bytes.max(record.downloaded_bytes);
                record.transfer_rate_bps = 0;
                record.eta_seconds = Some(0);
                record.thumbnail_path = thumbnail_path;
                if let Some(subtitle) = subtitle_path {
                    record.subtitle_paths = vec![subtitle];
                }
                Ok(record.clone())
            })
            .await;

        match finalized {
            Ok(record) => {
                self.inner
                    .hub
                    .publish_progress(ProgressUpdate {
                        id: id.clone(),
                        progress: 100.0,
                        rate_bps: 0,
                        total_bytes: record.total_bytes,
                        downloaded_bytes: record.downloaded_bytes,
                        eta_seconds: Some(0),
                    })
                    .await;
                self.inner.hub.drop_progress(id).await;

                info!("✅ Download completed for {id}");
                self.inner.hub.notify(
                    id,
                    record.display_title(),
                    "Download complete",
                    NotificationKind::Success,
                );
            }
            Err(e) => warn!("Could not finalize download {id}: {e}"),
        }
    }

    async fn fail_download(
        &self,
        id: &DownloadId,
        is_hls: bool,
        destination: &Path,
        cause: DownloadError,
    ) {
        error!("❌ Download failed for {id}: {cause}");

        // A failed HLS pipeline leaves no orphaned data behind
        if is_hls {
            self.remove_partial_data(id, destination).await;
        }

        let message = cause.to_string();
        let failed = self
            .mutate(|records| {
                let record = records
                    .get_mut(id)
                    .ok_or_else(|| DownloadError::DownloadNotFound(id.to_string()))?;
                if record.status.is_terminal() {
                    return Err(DownloadError::InvalidState(format!(
                        "Download {id} already {}",
                        record.status.as_str()
                    )));
                }
                apply_transition(record, DownloadStatus::Failed)?;
                record.error = Some(message.clone());
                record.transfer_rate_bps = 0;
                record.eta_seconds = None;
                Ok(record.display_title())
            })
            .await;

        match failed {
            Ok(title) => {
                self.inner.hub.drop_progress(id).await;
                self.inner
                    .hub
                    .notify(id, title, message, NotificationKind::Error);
            }
            Err(e) => debug!("Skipping failure transition for {id}: {e}"),
        }
    }

    /// Delete the destination file and scratch directory if present.
    /// Cleanup failures are logged and never propagate.
    async fn remove_partial_data(&self, id: &DownloadId, destination: &Path) {
        if let Err(e) = self.inner.fs.unlink(destination).await {
            warn!("Failed to remove partial file {destination:?}: {e:#}");
        }
        if let Ok(scratch) = self.inner.config.scratch_directory(id) {
            if let Err(e) = self.inner.fs.remove_dir_all(&scratch).await {
                warn!("Failed to remove scratch directory {scratch:?}: {e:#}");
            }
        }
    }

    /// Fetch the poster image next to the media file. Only absolute URLs
    /// are fetched; relative artwork paths belong to the metadata client.
    async fn fetch_thumbnail(&self, id: &DownloadId, poster: &str) -> Option<PathBuf> {
        if !poster.starts_with("http://") && !poster.starts_with("https://") {
            return None;
        }
        let dir = self.inner.config.thumbnail_directory().ok()?;
        if let Err(e) = self.inner.fs.mkdir_all(&dir).await {
            warn!("Failed to create thumbnail directory: {e:#}");
            return None;
        }

        let timeout = Duration::from_secs(self.inner.config.download_timeout_secs);
        let response = match self
            .inner
            .client
            .get(poster)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!("Thumbnail fetch for {id} returned HTTP {}", r.status());
                return None;
            }
            Err(e) => {
                warn!("Thumbnail fetch for {id} failed: {e}");
                return None;
            }
        };
        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Thumbnail read for {id} failed: {e}");
                return None;
            }
        };

        let path = dir.join(format!("{id}.jpg"));
        match self.inner.fs.write(&path, &bytes).await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to store thumbnail for {id}: {e:#}");
                None
            }
        }
    }

    /// Drop an empty sidecar next to the media file so later subtitle
    /// downloads have a stable slot. Best-effort.
    async fn write_subtitle_placeholder(&self, destination: &Path) -> Option<PathBuf> {
        let path = destination.with_extension("vtt");
        match self.inner.fs.write(&path, b"WEBVTT\n").await {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Failed to write subtitle placeholder {path:?}: {e:#}");
                None
            }
        }
    }
}

/// Apply a validated status transition, stamping the lifecycle timestamps.
fn apply_transition(
    record: &mut DownloadRecord,
    to: DownloadStatus,
) -> Result<(), DownloadError> {
    let from = record.status;
    if !is_valid_transition(from, to) {
        return Err(DownloadError::InvalidState(format!(
            "Invalid transition {} -> {} for {}",
            from.as_str(),
            to.as_str(),
            record.id
        )));
    }

    record.status = to;
    let now = Utc::now();
    record.updated_at = now;
    match to {
        DownloadStatus::Downloading => {
            if record.started_at.is_none() {
                record.started_at = Some(now);
            }
        }
        DownloadStatus::Completed => record.completed_at = Some(now),
        _ => {}
    }
    Ok(())
}

fn is_valid_transition(from: DownloadStatus, to: DownloadStatus) -> bool {
    use DownloadStatus::*;

    match (from, to) {
        // From Pending
        (Pending, Downloading) | (Pending, Failed) | (Pending, Cancelled) => true,

        // From Downloading
        (Downloading, Paused)
        | (Downloading, Completed)
        | (Downloading, Failed)
        | (Downloading, Cancelled) => true,

        // From Paused: resume in place, restart from scratch, or stop
        (Paused, Downloading) | (Paused, Pending) | (Paused, Failed) | (Paused, Cancelled) => {
            true
        }

        // Terminal states never transition
        _ => false,
    }
}
