//! Offline-first weather engine.
//!
//! This crate reconciles three sources of weather data: a remote weather
//! service, the persistent SQLite store from `nimbus-store`, and an
//! in-memory session cache. It also fills gaps in the recent history
//! cheaply and keeps the data fresh with a battery-aware background job.
//!
//! # Features
//!
//! - **Current weather**: network first, cache fallback with an offline signal
//! - **Historical gap-fill**: one range request for all missing days, with
//!   rate-limited per-day requests as fallback
//! - **Saved locations**: durable list with a protected device-location entry
//! - **Background refresh**: periodic, network-gated, retried with backoff,
//!   slower on low battery
//! - **Observability**: `watch` channels for state, a broadcast bus for events
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//! use nimbus_core::mock::{MockLocationProvider, MockNetwork};
//! use nimbus_core::{
//!     Collaborators, EngineOptions, EventDispatcher, LocationRegistry, Position, SystemClock,
//!     WeatherApiClient, WeatherEngine,
//! };
//! use nimbus_store::Store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(Mutex::new(Store::open_default()?));
//!     let registry = Arc::new(LocationRegistry::load(Arc::clone(&store)).await?);
//!     let engine = WeatherEngine::new(
//!         Collaborators {
//!             api: Arc::new(WeatherApiClient::new("https://api.weatherapi.com", "key")?),
//!             network: Arc::new(MockNetwork::new(true)),
//!             locator: Arc::new(MockLocationProvider::at(Position::new(59.91, 10.75))),
//!             clock: Arc::new(SystemClock::new()),
//!         },
//!         store,
//!         registry,
//!         EventDispatcher::default(),
//!         EngineOptions::default(),
//!     );
//!
//!     let weather = engine.get_selected_location_weather().await?;
//!     println!("{}", weather.location_name());
//!
//!     let history = engine.get_historical_weather(7).await?;
//!     println!("{} past days", history.len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod locations;
pub mod mock;
pub mod refresh;
pub mod retry;
pub mod scheduler;
pub mod traits;

pub use cache::SessionCache;
pub use client::WeatherApiClient;
pub use engine::{
    Collaborators, DEFAULT_PLACE, EngineOptions, HISTORY_RETENTION, REQUEST_SPACING,
    WeatherEngine, with_cancellation,
};
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventReceiver, EventSender, WeatherEvent};
pub use history::DEFAULT_HISTORY_DAYS;
pub use locations::{LocationRegistry, SELECTED_LOCATION_KEY};
pub use refresh::{BackgroundRefresh, REFRESH_JOB_NAME, RefreshPolicy, RefreshSignals};
pub use retry::RetryConfig;
pub use scheduler::{EnqueueOutcome, JobRunner, JobSpec, WorkOutcome, Worker};
pub use traits::{
    BatteryMonitor, Clock, LocationProvider, NetworkMonitor, Position, SystemClock, WeatherApi,
};

/// Shared handle to the persistent store.
pub type SharedStore = std::sync::Arc<tokio::sync::Mutex<nimbus_store::Store>>;
