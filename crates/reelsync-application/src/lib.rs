// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use reelsync_config::AppConfig;
use reelsync_infrastructure::{InMemoryMediaRepository, InMemorySourceRepository};
use tracing::info;

pub mod catalog;
pub mod download_state;
pub mod events;
pub mod fallback;
pub mod format_parser;
pub mod indexing;
pub mod matcher;
pub mod naming;


pub use catalog::{
    preferences_from_config, resolve_media_format, CatalogError, CatalogResult, CatalogService,
    DownloadPlan, DownloadRequest, IndexSummary,
};
pub use download_state::{
    derive_download_state, download_state, JobStatus, JobStatusError, JobStatusSource,
};
pub use events::{EventPublisher, InMemoryEventBus, RecordedEvent};
pub use fallback::{FallbackResolver, MatchTier};
pub use format_parser::{
    format_by_code, parse_format, parse_formats, CodecValue, FormatParseError, FormatRecord,
    StreamKind,
};
pub use indexing::{flatten_entries, Indexer, StaticIndexer};
pub use matcher::{
    FormatMatch, FormatMatcher, FormatResolution, FormatSelection, SelectedStreams, StreamRole,
};
pub use naming::{slugify, FilenameSynthesizer, MatchSummary, StorageLayout};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: CatalogService,
}

impl AppState {
    /// Application state backed by the in-memory stores.
    pub fn in_memory(config: AppConfig) -> Self {
        let catalog = CatalogService::from_config(
            &config,
            Arc::new(InMemorySourceRepository::new()),
            Arc::new(InMemoryMediaRepository::new()),
        );
        Self { config, catalog }
    }

    pub fn on_start(&self) {
        info!(
            target: "catalog",
            download_root = %self.catalog.filenames().layout().download_root().display(),
            max_concurrent_downloads = self.config.scheduler.max_concurrent_downloads,
            "application state initialized"
        );
    }
}
