//! Saved locations and the selected-location pointer.
//!
//! The registry persists both in the store and republishes them on
//! [`watch`] channels so that long-lived observers always see the latest
//! list without polling.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use nimbus_store::Store;
use nimbus_types::{CURRENT_LOCATION_ID, SavedLocation};

use crate::error::{Error, Result};

/// Preference key holding the selected location id.
pub const SELECTED_LOCATION_KEY: &str = "selected_location_id";

/// Durable list of saved locations plus the selected pointer.
///
/// Invariants:
/// - the current-location sentinel is always present and listed first
/// - the selected id always names a listed location
pub struct LocationRegistry {
    store: Arc<Mutex<Store>>,
    locations_tx: watch::Sender<Vec<SavedLocation>>,
    selected_tx: watch::Sender<String>,
}

impl LocationRegistry {
    /// Load the registry, synthesizing the sentinel and repairing a dangling
    /// selection if needed.
    pub async fn load(store: Arc<Mutex<Store>>) -> Result<Self> {
        let (locations, selected) = {
            let guard = store.lock().await;
            if guard.insert_location(&SavedLocation::current_location())? {
                info!("Created current-location entry");
            }
            let locations = sentinel_first(guard.list_locations()?);

            let selected = match guard.get_preference(SELECTED_LOCATION_KEY)? {
                Some(id) if locations.iter().any(|l| l.id == id) => id,
                other => {
                    if let Some(id) = other {
                        warn!("Selected location '{}' no longer exists, resetting", id);
                    }
                    guard.set_preference(SELECTED_LOCATION_KEY, CURRENT_LOCATION_ID)?;
                    CURRENT_LOCATION_ID.to_string()
                }
            };
            (locations, selected)
        };

        let (locations_tx, _) = watch::channel(locations);
        let (selected_tx, _) = watch::channel(selected);

        Ok(Self {
            store,
            locations_tx,
            selected_tx,
        })
    }

    /// Stream of the full location list.
    pub fn subscribe_locations(&self) -> watch::Receiver<Vec<SavedLocation>> {
        self.locations_tx.subscribe()
    }

    /// Stream of the selected location id.
    pub fn subscribe_selected(&self) -> watch::Receiver<String> {
        self.selected_tx.subscribe()
    }

    /// Current location list.
    pub fn locations(&self) -> Vec<SavedLocation> {
        self.locations_tx.borrow().clone()
    }

    pub fn selected_id(&self) -> String {
        self.selected_tx.borrow().clone()
    }

    /// The selected location, or the sentinel if it has gone missing.
    pub fn selected(&self) -> SavedLocation {
        let id = self.selected_id();
        self.get(&id)
            .unwrap_or_else(SavedLocation::current_location)
    }

    pub fn get(&self, id: &str) -> Option<SavedLocation> {
        self.locations_tx
            .borrow()
            .iter()
            .find(|l| l.id == id)
            .cloned()
    }

    /// Add a user location.
    pub async fn add(&self, location: SavedLocation) -> Result<SavedLocation> {
        if location.is_sentinel() || location.is_current {
            return Err(Error::ProtectedLocation(location.id));
        }

        let guard = self.store.lock().await;
        if !guard.insert_location(&location)? {
            return Err(Error::invalid_config(format!(
                "location id '{}' already exists",
                location.id
            )));
        }
        self.publish_locations(&guard)?;

        info!("Added location '{}' ({})", location.name, location.query);
        Ok(location)
    }

    /// Remove a user location.
    ///
    /// Its historical rows go too unless another saved location still uses
    /// the same query. If it was selected, the selection falls back to the
    /// sentinel.
    pub async fn remove(&self, id: &str) -> Result<()> {
        if id == CURRENT_LOCATION_ID {
            return Err(Error::ProtectedLocation(id.to_string()));
        }

        let guard = self.store.lock().await;
        let removed = guard.delete_location(id).map_err(|e| match e {
            nimbus_store::Error::LocationNotFound(id) => Error::LocationNotFound(id),
            other => Error::Storage(other),
        })?;

        let remaining = sentinel_first(guard.list_locations()?);
        let shared = remaining.iter().any(|l| l.query == removed.query);
        if shared {
            debug!("Keeping history for '{}', still in use", removed.query);
        } else if !removed.query.is_empty() {
            match guard.delete_historical_for(&removed.query) {
                Ok(n) if n > 0 => info!("Dropped {} historical rows for '{}'", n, removed.query),
                Ok(_) => {}
                Err(e) => warn!("Failed to drop history for '{}': {}", removed.query, e),
            }
        }
        self.locations_tx.send_replace(remaining);

        if *self.selected_tx.borrow() == id {
            self.selected_tx.send_replace(CURRENT_LOCATION_ID.to_string());
            guard.set_preference(SELECTED_LOCATION_KEY, CURRENT_LOCATION_ID)?;
        }

        info!("Removed location '{}'", removed.name);
        Ok(())
    }

    /// Point the selection at `id`.
    pub async fn set_selected(&self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::LocationNotFound(id.to_string()));
        }

        let guard = self.store.lock().await;
        guard.set_preference(SELECTED_LOCATION_KEY, id)?;
        self.selected_tx.send_replace(id.to_string());
        Ok(())
    }

    fn publish_locations(&self, store: &Store) -> Result<()> {
        let locations = sentinel_first(store.list_locations()?);
        self.locations_tx.send_replace(locations);
        Ok(())
    }
}

fn sentinel_first(mut locations: Vec<SavedLocation>) -> Vec<SavedLocation> {
    locations.sort_by_key(|l| !l.is_sentinel());
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_types::{LocationQuery, WeatherSnapshot, fixtures};
    use time::macros::{date, datetime};

    async fn registry() -> (LocationRegistry, Arc<Mutex<Store>>) {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        (LocationRegistry::load(Arc::clone(&store)).await.unwrap(), store)
    }

    #[tokio::test]
    async fn test_sentinel_synthesized_and_selected() {
        let (registry, _) = registry().await;
        let locations = registry.locations();
        assert_eq!(locations.len(), 1);
        assert!(locations[0].is_sentinel());
        assert_eq!(registry.selected_id(), CURRENT_LOCATION_ID);
    }

    #[tokio::test]
    async fn test_sentinel_cannot_be_removed() {
        let (registry, _) = registry().await;
        let err = registry.remove(CURRENT_LOCATION_ID).await.unwrap_err();
        assert!(matches!(err, Error::ProtectedLocation(_)));
        assert_eq!(registry.locations().len(), 1);
    }

    #[tokio::test]
    async fn test_removing_selected_resets_to_sentinel() {
        let (registry, store) = registry().await;
        let paris = registry
            .add(SavedLocation::new("Paris", "Paris, France"))
            .await
            .unwrap();
        registry.set_selected(&paris.id).await.unwrap();

        let mut selected_rx = registry.subscribe_selected();
        assert_eq!(*selected_rx.borrow_and_update(), paris.id);

        registry.remove(&paris.id).await.unwrap();
        assert!(selected_rx.has_changed().unwrap());
        assert_eq!(*selected_rx.borrow(), CURRENT_LOCATION_ID);
        assert_eq!(
            store
                .lock()
                .await
                .get_preference(SELECTED_LOCATION_KEY)
                .unwrap()
                .as_deref(),
            Some(CURRENT_LOCATION_ID)
        );
    }

    #[tokio::test]
    async fn test_removing_unselected_keeps_selection() {
        let (registry, _) = registry().await;
        let a = registry.add(SavedLocation::new("A", "qa")).await.unwrap();
        let b = registry.add(SavedLocation::new("B", "qb")).await.unwrap();
        registry.set_selected(&a.id).await.unwrap();
        registry.remove(&b.id).await.unwrap();
        assert_eq!(registry.selected_id(), a.id);
    }

    #[tokio::test]
    async fn test_remove_unknown_and_select_unknown() {
        let (registry, _) = registry().await;
        assert!(matches!(
            registry.remove("nope").await,
            Err(Error::LocationNotFound(_))
        ));
        assert!(matches!(
            registry.set_selected("nope").await,
            Err(Error::LocationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_drops_cached_history() {
        let (registry, store) = registry().await;
        let loc = registry.add(SavedLocation::new("Oslo", "Oslo")).await.unwrap();
        let q = LocationQuery::new("Oslo");
        {
            let guard = store.lock().await;
            let t = datetime!(2024-03-10 08:00 UTC);
            let day = WeatherSnapshot::historical(fixtures::response(&["2024-03-09"], false)).unwrap();
            let current = WeatherSnapshot::forecast(fixtures::response(&["2024-03-10"], true)).unwrap();
            guard.upsert_historical(date!(2024 - 03 - 09), &q, &day, t).unwrap();
            guard.upsert_current(&q, "Oslo", &current, t).unwrap();
        }

        registry.remove(&loc.id).await.unwrap();

        let guard = store.lock().await;
        assert_eq!(guard.count_historical(Some(&q)).unwrap(), 0);
        assert!(guard.get_current(&q).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_keeps_cache_shared_by_another_location() {
        let (registry, store) = registry().await;
        let home = registry.add(SavedLocation::new("Home", "Paris, France")).await.unwrap();
        let work = registry.add(SavedLocation::new("Work", "Paris, France")).await.unwrap();
        let q = LocationQuery::new("Paris, France");
        {
            let guard = store.lock().await;
            let t = datetime!(2024-03-10 08:00 UTC);
            let day = WeatherSnapshot::historical(fixtures::response(&["2024-03-09"], false)).unwrap();
            let current = WeatherSnapshot::forecast(fixtures::response(&["2024-03-10"], true)).unwrap();
            guard.upsert_historical(date!(2024 - 03 - 09), &q, &day, t).unwrap();
            guard.upsert_current(&q, "Paris", &current, t).unwrap();
        }

        registry.remove(&home.id).await.unwrap();

        {
            let guard = store.lock().await;
            assert_eq!(guard.count_historical(Some(&q)).unwrap(), 1);
            assert!(guard.get_current(&q).unwrap().is_some());
        }
        assert!(registry.get(&work.id).is_some());

        // Last user of the query takes its history with it
        registry.remove(&work.id).await.unwrap();
        assert_eq!(store.lock().await.count_historical(Some(&q)).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_publishes_list_when_selection_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.db");
        let store = Arc::new(Mutex::new(Store::open(&path).unwrap()));
        let registry = LocationRegistry::load(Arc::clone(&store)).await.unwrap();
        let loc = registry.add(SavedLocation::new("Oslo", "Oslo")).await.unwrap();
        registry.set_selected(&loc.id).await.unwrap();
        let locations = registry.subscribe_locations();

        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("DROP TABLE preferences")
            .unwrap();

        assert!(registry.remove(&loc.id).await.is_err());
        assert!(registry.get(&loc.id).is_none());
        assert!(locations.borrow().iter().all(|l| l.id != loc.id));
        assert_eq!(registry.selected_id(), CURRENT_LOCATION_ID);
    }

    #[tokio::test]
    async fn test_dangling_selection_repaired_on_load() {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        store
            .lock()
            .await
            .set_preference(SELECTED_LOCATION_KEY, "deleted-elsewhere")
            .unwrap();
        let registry = LocationRegistry::load(Arc::clone(&store)).await.unwrap();
        assert_eq!(registry.selected_id(), CURRENT_LOCATION_ID);
    }

    #[tokio::test]
    async fn test_add_rejects_sentinel() {
        let (registry, _) = registry().await;
        let err = registry
            .add(SavedLocation::current_location())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtectedLocation(_)));
    }
}
