//! The weather reconciliation engine.
//!
//! Decides, for every request, whether to answer from the network, the
//! in-memory session cache or the persistent store:
//!
//! 1. Clear the offline signal and resolve the request to a [`LocationQuery`].
//! 2. Offline: serve the session cache, then the store, else fail with
//!    [`Error::NoConnectivityNoCache`].
//! 3. Online: fetch, write through to both caches, return.
//! 4. A connectivity failure during the fetch falls back exactly as in 2;
//!    any other failure propagates.
//!
//! Historical gap-fill lives in [`crate::history`].

use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nimbus_store::Store;
use nimbus_types::{CachedWeather, LocationQuery, OfflineDataInfo, SavedLocation, WeatherSnapshot};

use crate::cache::SessionCache;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, WeatherEvent};
use crate::locations::LocationRegistry;
use crate::refresh::BackgroundRefresh;
use crate::traits::{Clock, LocationProvider, NetworkMonitor, WeatherApi};

/// Place used when the device position cannot be determined.
pub const DEFAULT_PLACE: &str = "Delhi, India";

/// Historical rows fetched longer ago than this are evicted.
pub const HISTORY_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Delay between consecutive per-day history requests.
pub const REQUEST_SPACING: Duration = Duration::from_millis(500);

/// Runtime tuning for [`WeatherEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Query used when the device position is unavailable.
    pub default_query: LocationQuery,
    /// Upper bound on a device position lookup.
    pub lookup_timeout: Duration,
    /// Days of forecast to request.
    pub forecast_days: u32,
    /// Request the air quality block.
    pub air_quality: bool,
    /// Age after which historical rows are evicted.
    pub retention: Duration,
    /// Delay between consecutive per-day history requests.
    pub request_spacing: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_query: LocationQuery::new(DEFAULT_PLACE),
            lookup_timeout: Duration::from_secs(10),
            forecast_days: 7,
            air_quality: true,
            retention: HISTORY_RETENTION,
            request_spacing: REQUEST_SPACING,
        }
    }
}

/// External collaborators the engine is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn WeatherApi>,
    pub network: Arc<dyn NetworkMonitor>,
    pub locator: Arc<dyn LocationProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Serves current and historical weather across online/offline transitions.
pub struct WeatherEngine {
    pub(crate) api: Arc<dyn WeatherApi>,
    network: Arc<dyn NetworkMonitor>,
    locator: Arc<dyn LocationProvider>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) store: Arc<Mutex<Store>>,
    registry: Arc<LocationRegistry>,
    pub(crate) options: EngineOptions,
    session: SessionCache,
    offline_tx: watch::Sender<Option<OfflineDataInfo>>,
    pub(crate) history_tx: watch::Sender<Vec<WeatherSnapshot>>,
    pub(crate) events: EventDispatcher,
    scheduler: OnceLock<Weak<BackgroundRefresh>>,
}

impl WeatherEngine {
    pub fn new(
        collaborators: Collaborators,
        store: Arc<Mutex<Store>>,
        registry: Arc<LocationRegistry>,
        events: EventDispatcher,
        options: EngineOptions,
    ) -> Self {
        let (offline_tx, _) = watch::channel(None);
        let (history_tx, _) = watch::channel(Vec::new());
        Self {
            api: collaborators.api,
            network: collaborators.network,
            locator: collaborators.locator,
            clock: collaborators.clock,
            store,
            registry,
            options,
            session: SessionCache::new(),
            offline_tx,
            history_tx,
            events,
            scheduler: OnceLock::new(),
        }
    }

    /// Let background refreshes re-arm the periodic job.
    ///
    /// Only the first call has an effect.
    pub fn attach_scheduler(&self, scheduler: &Arc<BackgroundRefresh>) {
        let _ = self.scheduler.set(Arc::downgrade(scheduler));
    }

    pub fn registry(&self) -> &Arc<LocationRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn session_cache(&self) -> &SessionCache {
        &self.session
    }

    /// Set while the last answer came from a cache; cleared on every fetch.
    pub fn offline_info(&self) -> watch::Receiver<Option<OfflineDataInfo>> {
        self.offline_tx.subscribe()
    }

    /// The most recently published historical window, newest first.
    pub fn historical_data(&self) -> watch::Receiver<Vec<WeatherSnapshot>> {
        self.history_tx.subscribe()
    }

    /// Engine and scheduler events, including background refresh times.
    pub fn background_refresh_events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Resolve a location to the query used as cache key.
    ///
    /// `None` and the current-location entry resolve through the device
    /// position; a saved place uses its query verbatim. Every failure path
    /// ends at the default place.
    pub async fn resolve_query(&self, location: Option<&SavedLocation>) -> LocationQuery {
        match location {
            Some(loc) if !loc.is_current => {
                if loc.query.is_empty() {
                    self.options.default_query.clone()
                } else {
                    loc.query.clone()
                }
            }
            _ => self.locate(false).await,
        }
    }

    async fn locate(&self, fresh: bool) -> LocationQuery {
        let lookup = async {
            if fresh {
                self.locator.fresh_position().await
            } else {
                self.locator.current_position().await
            }
        };

        match tokio::time::timeout(self.options.lookup_timeout, lookup).await {
            Ok(Ok(position)) => position.to_query(),
            Ok(Err(e)) => {
                warn!(
                    "Location lookup failed ({}), using '{}'",
                    e, self.options.default_query
                );
                self.options.default_query.clone()
            }
            Err(_) => {
                warn!(
                    "Location lookup timed out after {:?}, using '{}'",
                    self.options.lookup_timeout, self.options.default_query
                );
                self.options.default_query.clone()
            }
        }
    }

    /// Current conditions and forecast for `location`.
    ///
    /// Offline with a cached snapshot is a success; the offline signal then
    /// carries the cached location name and fetch time.
    pub async fn get_current_weather(
        &self,
        location: Option<&SavedLocation>,
    ) -> Result<WeatherSnapshot> {
        self.offline_tx.send_replace(None);

        let query = self.resolve_query(location).await;

        if !self.network.is_connected().await {
            info!("No network, serving '{}' from cache", query);
            return self.serve_cached(&query).await;
        }

        match self.fetch_and_store(&query).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) if e.is_connectivity() => {
                warn!("Fetch for '{}' failed ({}), falling back to cache", query, e);
                self.serve_cached(&query).await
            }
            Err(e) => Err(e),
        }
    }

    /// [`Self::get_current_weather`] for the registry's selected location.
    pub async fn get_selected_location_weather(&self) -> Result<WeatherSnapshot> {
        let selected = self.registry.selected();
        self.get_current_weather(Some(&selected)).await
    }

    /// Fetch for a fresh device position and re-arm the background job.
    ///
    /// Never consults a cache for either the position or the weather.
    pub async fn refresh_current_location_weather(&self) -> Result<WeatherSnapshot> {
        let query = self.locate(true).await;
        let snapshot = self.fetch_and_store(&query).await?;

        if let Some(scheduler) = self.scheduler.get().and_then(Weak::upgrade) {
            scheduler.schedule_periodic_refresh().await;
        }

        let at = self.clock.now();
        self.events.send(WeatherEvent::BackgroundRefresh { at });
        info!("Background refresh for '{}' complete", query);

        Ok(snapshot)
    }

    #[tracing::instrument(skip(self), fields(query = %query))]
    async fn fetch_and_store(&self, query: &LocationQuery) -> Result<WeatherSnapshot> {
        let response = self
            .api
            .fetch_forecast(query, self.options.forecast_days, self.options.air_quality)
            .await?;
        let snapshot = WeatherSnapshot::forecast(response)?;
        let now = self.clock.now();

        self.session
            .insert(query.clone(), CachedWeather::fresh(snapshot.clone(), now))
            .await;

        let store = self.store.lock().await;
        if let Err(e) = store.upsert_current(query, snapshot.location_name(), &snapshot, now) {
            warn!("Failed to persist current weather for '{}': {}", query, e);
        }

        debug!("Fetched current weather for '{}'", snapshot.location_name());
        Ok(snapshot)
    }

    async fn serve_cached(&self, query: &LocationQuery) -> Result<WeatherSnapshot> {
        if let Some(hit) = self.session.get(query).await {
            debug!("Session cache hit for '{}'", query);
            self.mark_offline(hit.snapshot.location_name().to_string(), hit.timestamp);
            return Ok(hit.snapshot);
        }

        let record = {
            let store = self.store.lock().await;
            store.get_current(query)
        };

        match record {
            Ok(Some(record)) => {
                debug!("Persistent cache hit for '{}'", query);
                let entry =
                    CachedWeather::fresh(record.weather_data.clone(), record.timestamp).into_cached();
                self.session.insert(query.clone(), entry).await;
                self.mark_offline(record.location_name, record.timestamp);
                Ok(record.weather_data)
            }
            Ok(None) => Err(Error::NoConnectivityNoCache {
                query: query.to_string(),
            }),
            Err(e) => {
                warn!("Cache read for '{}' failed: {}", query, e);
                Err(Error::NoConnectivityNoCache {
                    query: query.to_string(),
                })
            }
        }
    }

    fn mark_offline(&self, location_name: String, fetched_at: OffsetDateTime) {
        self.offline_tx
            .send_replace(Some(OfflineDataInfo::new(location_name.clone(), fetched_at)));
        self.events.send(WeatherEvent::ServedFromCache {
            location_name,
            fetched_at,
        });
    }
}

/// Run `fut`, giving up with [`Error::Cancelled`] when `token` fires.
///
/// Dropping the future abandons any in-flight request or position lookup.
pub async fn with_cancellation<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
