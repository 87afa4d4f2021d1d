// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory keyed stores standing in for the persistence layer.

use anyhow::{anyhow, bail, Result};
use reelsync_domain::{Media, MediaId, Source, SourceId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::repositories::{MediaRepository, SourceRepository};

#[derive(Clone, Default)]
pub struct InMemorySourceRepository {
    sources: Arc<RwLock<HashMap<SourceId, Source>>>,
}

impl InMemorySourceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn create(&self, source: Source) -> Result<Source> {
        debug!(target: "repository", source_id = %source.id, key = %source.key, "creating source");
        let mut sources = self.sources.write().await;
        if sources.values().any(|s| s.key == source.key) {
            bail!("source with key {} already exists", source.key);
        }
        sources.insert(source.id, source.clone());
        Ok(source)
    }

    async fn get(&self, id: SourceId) -> Result<Option<Source>> {
        Ok(self.sources.read().await.get(&id).cloned())
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<Source>> {
        Ok(self
            .sources
            .read()
            .await
            .values()
            .find(|s| s.key == key)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Source>> {
        let mut out: Vec<Source> = self.sources.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn update(&self, source: Source) -> Result<Source> {
        debug!(target: "repository", source_id = %source.id, "updating source");
        let mut sources = self.sources.write().await;
        if sources
            .values()
            .any(|s| s.key == source.key && s.id != source.id)
        {
            bail!("source with key {} already exists", source.key);
        }
        let slot = sources
            .get_mut(&source.id)
            .ok_or_else(|| anyhow!("source {} not found", source.id))?;
        *slot = source.clone();
        Ok(source)
    }

    async fn delete(&self, id: SourceId) -> Result<()> {
        debug!(target: "repository", source_id = %id, "deleting source");
        self.sources.write().await.remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMediaRepository {
    media: Arc<RwLock<HashMap<MediaId, Media>>>,
}

impl InMemoryMediaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MediaRepository for InMemoryMediaRepository {
    async fn create(&self, media: Media) -> Result<Media> {
        debug!(target: "repository", media_id = %media.id, key = %media.key, "creating media");
        let mut items = self.media.write().await;
        if items
            .values()
            .any(|m| m.source_id == media.source_id && m.key == media.key)
        {
            bail!(
                "media with key {} already exists for source {}",
                media.key,
                media.source_id
            );
        }
        items.insert(media.id, media.clone());
        Ok(media)
    }

    async fn get(&self, id: MediaId) -> Result<Option<Media>> {
        Ok(self.media.read().await.get(&id).cloned())
    }

    async fn get_by_key(&self, source_id: SourceId, key: &str) -> Result<Option<Media>> {
        Ok(self
            .media
            .read()
            .await
            .values()
            .find(|m| m.source_id == source_id && m.key == key)
            .cloned())
    }

    async fn list_by_source(&self, source_id: SourceId) -> Result<Vec<Media>> {
        let mut out: Vec<Media> = self
            .media
            .read()
            .await
            .values()
            .filter(|m| m.source_id == source_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(out)
    }

    async fn update(&self, media: Media) -> Result<Media> {
        debug!(target: "repository", media_id = %media.id, "updating media");
        let mut items = self.media.write().await;
        let slot = items
            .get_mut(&media.id)
            .ok_or_else(|| anyhow!("media {} not found", media.id))?;
        *slot = media.clone();
        Ok(media)
    }

    async fn delete_by_source(&self, source_id: SourceId) -> Result<usize> {
        let mut items = self.media.write().await;
        let before = items.len();
        items.retain(|_, m| m.source_id != source_id);
        let removed = before - items.len();
        debug!(target: "repository", source_id = %source_id, removed, "deleted media for source");
        Ok(removed)
    }
}
