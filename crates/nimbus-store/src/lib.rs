//! Local persistence for Nimbus weather data.
//!
//! This crate provides SQLite-based storage that lets the reconciliation
//! engine serve weather while offline and avoid re-fetching historical days.
//!
//! # Features
//!
//! - Latest snapshot per location query (`current_weather`)
//! - One snapshot per `(date, location query)` (`historical_weather`)
//! - Age-based eviction and per-location cleanup
//! - Saved locations and key/value preferences
//!
//! # Example
//!
//! ```no_run
//! use nimbus_store::Store;
//! use nimbus_types::LocationQuery;
//! use time::macros::date;
//!
//! let store = Store::open_default()?;
//!
//! let query = LocationQuery::new("Delhi, India");
//! let week = store.get_historical_in_range(&query, date!(2024 - 03 - 01), date!(2024 - 03 - 07))?;
//! println!("{} cached days", week.len());
//! # Ok::<(), nimbus_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{CacheStats, CurrentWeatherRecord, HistoricalWeatherRecord};
pub use queries::HistoricalQuery;
pub use schema::SCHEMA_VERSION;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/nimbus/weather.db`
/// - macOS: `~/Library/Application Support/nimbus/weather.db`
/// - Windows: `C:\Users\<user>\AppData\Local\nimbus\weather.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("nimbus")
        .join("weather.db")
}
