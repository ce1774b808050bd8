use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::{PlaceId, VisitedSet};
use tokio::sync::Mutex;
use tracing::{debug, warn};

mod sqlite;
pub use sqlite::SqlitePreferenceStore;

/// Entry holding the JSON array of visited place ids.
pub const VISITED_PLACES_KEY: &str = "visitedPlaces";

/// Opaque key-value byte store. Writes overwrite the whole value.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Visited-id set layered over a [`PreferenceStore`].
#[derive(Clone)]
pub struct VisitedPlaces {
    store: Arc<dyn PreferenceStore>,
}

impl VisitedPlaces {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// Absent, unreadable or corrupt data yields an empty set.
    pub async fn get_visited_ids(&self) -> VisitedSet {
        let raw = match self.store.get(VISITED_PLACES_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return VisitedSet::new(),
            Err(err) => {
                warn!(error = %err, "prefs: failed to read visited places; using empty set");
                return VisitedSet::new();
            }
        };

        match serde_json::from_slice::<Vec<PlaceId>>(&raw) {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                warn!(error = %err, "prefs: visited places entry is corrupt; using empty set");
                VisitedSet::new()
            }
        }
    }

    pub async fn set_visited_ids(&self, ids: &VisitedSet) -> Result<()> {
        let raw = serde_json::to_vec(&ids.iter().collect::<Vec<_>>())
            .context("failed to encode visited places")?;
        self.store
            .set(VISITED_PLACES_KEY, &raw)
            .await
            .context("failed to persist visited places")?;
        debug!(count = ids.len(), "prefs: visited places persisted");
        Ok(())
    }

    /// Read-modify-write of a single membership. Returns the stored set.
    pub async fn mark(&self, id: &PlaceId, visited: bool) -> Result<VisitedSet> {
        let mut ids = self.get_visited_ids().await;
        if visited {
            ids.insert(id.clone());
        } else {
            ids.remove(id);
        }
        self.set_visited_ids(&ids).await?;
        Ok(ids)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
