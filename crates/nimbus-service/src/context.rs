//! Application-scoped lifecycle object.
//!
//! [`AppContext`] owns every long-lived service and hands them their
//! dependencies explicitly. Dropping it (or calling
//! [`AppContext::shutdown`]) stops the background job.
//!
//! # Event Bus
//!
//! Engine and scheduler events go through a single broadcast channel.
//! Subscribers that fall behind lose the oldest events; senders never block.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use nimbus_core::{
    BackgroundRefresh, BatteryMonitor, Collaborators, EventDispatcher, EventReceiver, JobRunner,
    LocationRegistry, Result, SharedStore, SystemClock, WeatherApiClient, WeatherEngine,
};
use nimbus_store::Store;

use crate::config::Config;
use crate::platform::{ConfiguredPosition, SysfsBattery, TcpProbe};

/// Capacity of the event bus.
pub const EVENT_BUFFER: usize = 100;

/// Shared application services.
pub struct AppContext {
    pub config: Config,
    pub store: SharedStore,
    pub registry: Arc<LocationRegistry>,
    pub engine: Arc<WeatherEngine>,
    pub refresh: Arc<BackgroundRefresh>,
    runner: Arc<JobRunner>,
    events: EventDispatcher,
}

impl AppContext {
    /// Wire the services from explicit collaborators.
    pub async fn build(
        config: Config,
        store: Store,
        collaborators: Collaborators,
        battery: Arc<dyn BatteryMonitor>,
    ) -> Result<Arc<Self>> {
        let store: SharedStore = Arc::new(Mutex::new(store));
        let registry = Arc::new(LocationRegistry::load(Arc::clone(&store)).await?);
        let events = EventDispatcher::new(EVENT_BUFFER);
        let runner = Arc::new(JobRunner::new(Arc::clone(&collaborators.network)));

        let engine = Arc::new(WeatherEngine::new(
            collaborators,
            Arc::clone(&store),
            Arc::clone(&registry),
            events.clone(),
            config.engine_options(),
        ));
        let refresh = BackgroundRefresh::new(
            Arc::clone(&engine),
            battery,
            Arc::clone(&runner),
            config.refresh_policy(),
        );

        Ok(Arc::new(Self {
            config,
            store,
            registry,
            engine,
            refresh,
            runner,
            events,
        }))
    }

    /// Wire the services with the host adapters described by `config`.
    pub async fn from_config(config: Config) -> Result<Arc<Self>> {
        info!("Opening database at {:?}", config.storage.path);
        let store = Store::open(&config.storage.path)?;

        let api = WeatherApiClient::with_timeout(
            &config.api.base_url,
            &config.api.api_key,
            config.api.timeout(),
        )?;
        let network = TcpProbe::for_url(&config.api.base_url, config.api.timeout())?;
        let locator = ConfiguredPosition::new(config.location.latitude, config.location.longitude);

        let collaborators = Collaborators {
            api: Arc::new(api),
            network: Arc::new(network),
            locator: Arc::new(locator),
            clock: Arc::new(SystemClock::new()),
        };
        Self::build(config, store, collaborators, Arc::new(SysfsBattery::default())).await
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Stop every background job.
    pub fn shutdown(&self) {
        self.refresh.cancel();
        self.runner.shutdown();
        info!("Background jobs stopped");
    }
}
