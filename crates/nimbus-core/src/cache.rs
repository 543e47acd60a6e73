//! Process-lifetime in-memory accelerator in front of the persistent store.

use std::collections::HashMap;

use tokio::sync::RwLock;

use nimbus_types::{CachedWeather, LocationQuery};

/// In-memory map from query to the last snapshot seen for it.
///
/// Never authoritative: it starts empty on every launch and is only
/// consulted before the persistent store.
#[derive(Debug, Default)]
pub struct SessionCache {
    entries: RwLock<HashMap<LocationQuery, CachedWeather>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, query: &LocationQuery) -> Option<CachedWeather> {
        self.entries.read().await.get(query).cloned()
    }

    /// Insert or replace the entry for `query`.
    pub async fn insert(&self, query: LocationQuery, entry: CachedWeather) {
        self.entries.write().await.insert(query, entry);
    }

    pub async fn remove(&self, query: &LocationQuery) -> Option<CachedWeather> {
        self.entries.write().await.remove(query)
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
