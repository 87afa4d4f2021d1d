// SPDX-License-Identifier: GPL-3.0-or-later

//! Contract with the external indexer that lists a source's items.

use anyhow::Result;
use async_trait::async_trait;
use reelsync_domain::Source;
use serde_json::Value;
use tracing::debug;

/// Produces the raw index response for a source: a playlist-like object whose
/// `entries` may themselves be playlists.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn index(&self, source: &Source) -> Result<Value>;
}

/// Indexer that replays a fixed response, e.g. a metadata dump read from disk.
#[derive(Debug, Clone)]
pub struct StaticIndexer {
    response: Value,
}

impl StaticIndexer {
    pub fn new(response: Value) -> Self {
        Self { response }
    }
}

#[async_trait]
impl Indexer for StaticIndexer {
    async fn index(&self, source: &Source) -> Result<Value> {
        debug!(target: "indexing", source_id = %source.id, "replaying static index response");
        Ok(self.response.clone())
    }
}

/// Leaf items of a possibly nested index response, depth-first and in source
/// order. Empty or null entries are skipped; an entry with non-empty
/// `entries` of its own is treated as a nested playlist.
pub fn flatten_entries(response: &Value) -> Vec<Value> {
    let mut items = Vec::new();
    collect_entries(response, &mut items);
    items
}

fn collect_entries(playlist: &Value, items: &mut Vec<Value>) {
    let Some(entries) = playlist.get("entries").and_then(Value::as_array) else {
        return;
    };
    for entry in entries {
        if is_empty(entry) {
            continue;
        }
        let nested = entry
            .get("entries")
            .and_then(Value::as_array)
            .is_some_and(|sub| !sub.is_empty());
        if nested {
            collect_entries(entry, items);
        } else {
            items.push(entry.clone());
        }
    }
}

fn is_empty(entry: &Value) -> bool {
    match entry {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
