// SPDX-License-Identifier: GPL-3.0-or-later

//! Catalog service: glue between persistence, the indexer and the matcher.
//!
//! Handles:
//! - registering sources and indexing them into media items
//! - planning downloads (one decision per media item at a time)
//! - recording completed downloads exactly once
//! - deriving the live download state
//! - deleting a source together with its media

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::Utc;
use reelsync_config::{AppConfig, SourceDefaultsConfig};
use reelsync_domain::{
    ConfigurationError, DomainError, DomainEvent, DownloadState, DownloadedAttributes, Media,
    MediaCreatedPayload, MediaDownloadedPayload, MediaId, MediaMetadata, Source,
    SourceDeletedPayload, SourceId, SourcePreferences, Validate,
};
use reelsync_infrastructure::{MediaRepository, SourceRepository};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tracing::{debug, info, warn};

use crate::download_state::{download_state, JobStatusSource};
use crate::events::{
    EventPublisher, InMemoryEventBus, MEDIA_CREATED, MEDIA_DOWNLOADED, SOURCE_DELETED,
};
use crate::format_parser::parse_formats;
use crate::indexing::{flatten_entries, Indexer};
use crate::matcher::{FormatMatcher, FormatResolution};
use crate::naming::{FilenameSynthesizer, StorageLayout};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("source not found: {0}")]
    SourceNotFound(SourceId),

    #[error("media not found: {0}")]
    MediaNotFound(MediaId),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("indexing source {0} failed: {1}")]
    Indexing(SourceId, String),

    #[error("repository error: {0}")]
    Repository(#[from] anyhow::Error),

    #[error("catalog is shutting down")]
    Shutdown,
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Outcome of one indexing pass over a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub discovered: usize,
    pub created: usize,
    pub refreshed: usize,
    pub downloadable: usize,
    /// Entries without an item key.
    pub skipped: usize,
}

/// Everything the download tool needs for one media item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub media_id: MediaId,
    pub url: String,
    pub format_string: String,
    pub extension: String,
    pub file_path: PathBuf,
    pub matched_exactly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadPlan {
    Ready(DownloadRequest),
    Undownloadable,
}

/// Validate configured defaults into source preferences.
pub fn preferences_from_config(
    defaults: &SourceDefaultsConfig,
) -> Result<SourcePreferences, ConfigurationError> {
    SourcePreferences::from_raw(
        &defaults.resolution,
        &defaults.vcodec,
        &defaults.acodec,
        defaults.prefer_60fps,
        defaults.prefer_hdr,
        &defaults.fallback,
    )
}

/// Run the matcher over a media item's current metadata.
pub fn resolve_media_format(source: &Source, media: &Media) -> FormatResolution {
    let metadata = media.metadata_view(source.source_type);
    let formats = parse_formats(metadata.formats());
    FormatMatcher::new(&source.preferences, &formats).resolve_format()
}

type MediaLocks = Arc<StdMutex<HashMap<MediaId, Arc<Mutex<()>>>>>;

/// Exclusive hold on one media item. The map entry is removed on drop once no
/// other task holds or waits for it.
struct MediaLock {
    media_id: MediaId,
    locks: MediaLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MediaLock {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.media_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.media_id);
        }
    }
}

#[derive(Clone)]
pub struct CatalogService {
    sources: Arc<dyn SourceRepository>,
    media: Arc<dyn MediaRepository>,
    filenames: FilenameSynthesizer,
    events: InMemoryEventBus,
    media_locks: MediaLocks,
    download_slots: Arc<Semaphore>,
}

impl CatalogService {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        media: Arc<dyn MediaRepository>,
        filenames: FilenameSynthesizer,
        max_concurrent_downloads: usize,
    ) -> Self {
        Self {
            sources,
            media,
            filenames,
            events: InMemoryEventBus::new(),
            media_locks: Arc::new(StdMutex::new(HashMap::new())),
            download_slots: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        sources: Arc<dyn SourceRepository>,
        media: Arc<dyn MediaRepository>,
    ) -> Self {
        let layout = StorageLayout::from(&config.storage);
        Self::new(
            sources,
            media,
            FilenameSynthesizer::new(layout),
            config.scheduler.max_concurrent_downloads,
        )
    }

    pub fn events(&self) -> &InMemoryEventBus {
        &self.events
    }

    pub fn filenames(&self) -> &FilenameSynthesizer {
        &self.filenames
    }

    pub async fn add_source(&self, source: Source) -> CatalogResult<Source> {
        if let Err(errors) = source.validate() {
            let message = errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CatalogError::InvalidSource(message));
        }
        let source = self.sources.create(source).await?;
        info!(
            target: "catalog",
            source_id = %source.id,
            key = %source.key,
            format = %source.preferences.format_summary(),
            "source added"
        );
        Ok(source)
    }

    pub async fn list_media(&self, source_id: SourceId) -> CatalogResult<Vec<Media>> {
        Ok(self.media.list_by_source(source_id).await?)
    }

    /// Index a source: create media seen for the first time, refresh the
    /// metadata of known ones and recompute whether each can be downloaded.
    #[tracing::instrument(skip(self, indexer), fields(source_id = %source_id))]
    pub async fn index_source(
        &self,
        source_id: SourceId,
        indexer: &dyn Indexer,
    ) -> CatalogResult<IndexSummary> {
        let mut source = self.load_source(source_id).await?;

        let response = match indexer.index(&source).await {
            Ok(response) => response,
            Err(err) => {
                warn!(target: "indexing", source_id = %source.id, error = %err, "indexing failed");
                source.has_failed = true;
                source.updated_at = Utc::now();
                self.sources.update(source).await?;
                return Err(CatalogError::Indexing(source_id, err.to_string()));
            }
        };

        let schema = source.source_type.metadata_schema();
        let mut summary = IndexSummary::default();
        for entry in flatten_entries(&response) {
            summary.discovered += 1;
            let Some(key) = MediaMetadata::from_value(entry.clone(), schema).key() else {
                debug!(target: "indexing", "skipping entry without a key");
                summary.skipped += 1;
                continue;
            };
            let raw = entry.to_string();

            let media = match self.media.get_by_key(source.id, &key).await? {
                Some(mut media) => {
                    media.refresh_metadata(source.source_type, raw);
                    media.can_download = resolve_media_format(&source, &media).is_downloadable();
                    summary.refreshed += 1;
                    self.media.update(media).await?
                }
                None => {
                    let mut media = Media::new(source.id, key);
                    media.refresh_metadata(source.source_type, raw);
                    media.can_download = resolve_media_format(&source, &media).is_downloadable();
                    summary.created += 1;
                    let media = self.media.create(media).await?;
                    self.events.publish(&DomainEvent::new(
                        MEDIA_CREATED,
                        MediaCreatedPayload {
                            media_id: media.id,
                            source_id: source.id,
                            key: media.key.clone(),
                        },
                    ));
                    media
                }
            };
            if media.can_download {
                summary.downloadable += 1;
            }
        }

        let now = Utc::now();
        source.last_crawl = Some(now);
        source.has_failed = false;
        source.updated_at = now;
        self.sources.update(source).await?;

        info!(
            target: "catalog",
            discovered = summary.discovered,
            created = summary.created,
            refreshed = summary.refreshed,
            downloadable = summary.downloadable,
            "source indexed"
        );
        Ok(summary)
    }

    /// Decide what to download for a media item. Decisions for the same item
    /// are serialized.
    pub async fn plan_download(&self, media_id: MediaId) -> CatalogResult<DownloadPlan> {
        let _slot = self
            .download_slots
            .acquire()
            .await
            .map_err(|_| CatalogError::Shutdown)?;
        let _lock = self.lock_media(media_id).await;

        let mut media = self.load_media(media_id).await?;
        if media.downloaded {
            return Err(DomainError::AlreadyDownloaded(media_id).into());
        }
        let source = self.load_source(media.source_id).await?;

        let resolution = resolve_media_format(&source, &media);
        if media.can_download != resolution.is_downloadable() {
            media.can_download = resolution.is_downloadable();
            media.updated_at = Utc::now();
            media = self.media.update(media).await?;
        }

        let plan = match resolution.selection() {
            Some(selection) => DownloadPlan::Ready(DownloadRequest {
                media_id,
                url: media.url(source.source_type),
                format_string: selection.format_string(),
                extension: source.extension().to_string(),
                file_path: self.filenames.file_path(&source, &media),
                matched_exactly: selection.matched_exactly(),
            }),
            None => {
                info!(target: "catalog", media_id = %media_id, "no viable format");
                DownloadPlan::Undownloadable
            }
        };
        Ok(plan)
    }

    /// Record a completed download. The attributes are stored once; a second
    /// call fails with [`DomainError::AlreadyDownloaded`].
    pub async fn record_download(
        &self,
        media_id: MediaId,
        attributes: DownloadedAttributes,
    ) -> CatalogResult<Media> {
        let _lock = self.lock_media(media_id).await;

        let mut media = self.load_media(media_id).await?;
        let source = self.load_source(media.source_id).await?;
        let path = self.filenames.file_path(&source, &media);
        media.mark_downloaded(attributes, path.clone())?;
        let media = self.media.update(media).await?;

        self.events.publish(&DomainEvent::new(
            MEDIA_DOWNLOADED,
            MediaDownloadedPayload {
                media_id,
                source_id: source.id,
                path: path.display().to_string(),
            },
        ));
        info!(target: "catalog", media_id = %media_id, path = %path.display(), "download recorded");
        Ok(media)
    }

    pub async fn download_state(
        &self,
        media_id: MediaId,
        jobs: &dyn JobStatusSource,
    ) -> CatalogResult<DownloadState> {
        let media = self.load_media(media_id).await?;
        Ok(download_state(&media, jobs))
    }

    /// Delete a source and every media item it owns. Returns the number of
    /// media items removed.
    pub async fn delete_source(&self, source_id: SourceId) -> CatalogResult<usize> {
        let source = self.load_source(source_id).await?;
        let removed = self.media.delete_by_source(source.id).await?;
        self.sources.delete(source.id).await?;

        self.events.publish(&DomainEvent::new(
            SOURCE_DELETED,
            SourceDeletedPayload {
                source_id,
                media_removed: removed,
            },
        ));
        info!(target: "catalog", source_id = %source_id, media_removed = removed, "source deleted");
        Ok(removed)
    }

    pub async fn source(&self, source_id: SourceId) -> CatalogResult<Source> {
        self.load_source(source_id).await
    }

    async fn lock_media(&self, media_id: MediaId) -> MediaLock {
        let entry = self
            .media_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(media_id)
            .or_default()
            .clone();
        // Built before awaiting so a cancelled wait still prunes the entry.
        let mut lock = MediaLock {
            media_id,
            locks: Arc::clone(&self.media_locks),
            guard: None,
        };
        lock.guard = Some(entry.lock_owned().await);
        lock
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.media_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn load_source(&self, source_id: SourceId) -> CatalogResult<Source> {
        self.sources
            .get(source_id)
            .await?
            .ok_or(CatalogError::SourceNotFound(source_id))
    }

    async fn load_media(&self, media_id: MediaId) -> CatalogResult<Media> {
        self.media
            .get(media_id)
            .await?
            .ok_or(CatalogError::MediaNotFound(media_id))
    }
}
