// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use reelsync_domain::DomainEvent;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub const MEDIA_CREATED: &str = "media.created";
pub const MEDIA_DOWNLOADED: &str = "media.downloaded";
pub const SOURCE_DELETED: &str = "source.deleted";

/// Sink for catalog domain events.
pub trait EventPublisher: Send + Sync {
    fn publish<T>(&self, event: &DomainEvent<T>)
    where
        T: Serialize + Send + Sync + 'static;
}

/// An event as captured by [`InMemoryEventBus`], payload already serialized.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub name: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

/// Keeps published events in memory until drained.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, Vec<RecordedEvent>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }

    /// Retrieve and clear all captured events.
    pub fn drain(&self) -> Vec<RecordedEvent> {
        std::mem::take(&mut *self.events())
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish<T>(&self, event: &DomainEvent<T>)
    where
        T: Serialize + Send + Sync + 'static,
    {
        let payload = match serde_json::to_value(&event.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: "catalog", event = event.name, error = %err, "dropping unserializable event");
                return;
            }
        };
        self.events().push(RecordedEvent {
            name: event.name,
            occurred_at: event.occurred_at,
            payload,
        });
    }
}
