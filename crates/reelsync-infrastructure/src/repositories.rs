// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Result;
use reelsync_domain::{Media, MediaId, Source, SourceId};

// ============================================================================
// Repository Traits
// ============================================================================

/// Source persistence. Keys are unique across all sources.
#[async_trait::async_trait]
pub trait SourceRepository: Send + Sync {
    async fn create(&self, source: Source) -> Result<Source>;
    async fn get(&self, id: SourceId) -> Result<Option<Source>>;
    async fn get_by_key(&self, key: &str) -> Result<Option<Source>>;
    async fn list(&self) -> Result<Vec<Source>>;
    async fn update(&self, source: Source) -> Result<Source>;
    async fn delete(&self, id: SourceId) -> Result<()>;
}

/// Media persistence. `(source_id, key)` is unique.
#[async_trait::async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, media: Media) -> Result<Media>;
    async fn get(&self, id: MediaId) -> Result<Option<Media>>;
    async fn get_by_key(&self, source_id: SourceId, key: &str) -> Result<Option<Media>>;
    async fn list_by_source(&self, source_id: SourceId) -> Result<Vec<Media>>;
    async fn update(&self, media: Media) -> Result<Media>;
    /// Remove every media item owned by a source, returning how many were removed.
    async fn delete_by_source(&self, source_id: SourceId) -> Result<usize>;
}
