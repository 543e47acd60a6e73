//! Platform-agnostic types for the Nimbus weather stack.
//!
//! This crate provides the data model shared by the store (`nimbus-store`),
//! the reconciliation engine (`nimbus-core`) and the service binary.
//!
//! # Features
//!
//! - Wire model for the forecast and history endpoints
//! - [`WeatherSnapshot`], which separates forecast and historical payloads
//! - Saved locations and the opaque [`LocationQuery`] cache key
//! - `yyyy-MM-dd` date helpers and the historical window
//! - Error types for payload interpretation
//!
//! # Example
//!
//! ```
//! use nimbus_types::{WeatherResponse, WeatherSnapshot};
//!
//! let json = r#"{
//!     "location": {"name": "Oslo", "region": "", "country": "Norway", "lat": 59.91,
//!                  "lon": 10.75, "tz_id": "Europe/Oslo", "localtime_epoch": 0,
//!                  "localtime": "2024-03-01 12:00"},
//!     "forecast": {"forecastday": []}
//! }"#;
//! let response: WeatherResponse = serde_json::from_str(json).unwrap();
//! // Without a current block this can only be a historical payload, and an
//! // empty one at that.
//! assert!(WeatherSnapshot::forecast(response.clone()).is_err());
//! assert!(WeatherSnapshot::historical(response).is_err());
//! ```

pub mod dates;
pub mod error;
pub mod fixtures;
pub mod location;
pub mod snapshot;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use location::{CURRENT_LOCATION_ID, CURRENT_LOCATION_NAME, LocationQuery, SavedLocation};
pub use snapshot::{CachedWeather, OfflineDataInfo, WeatherSnapshot, sort_newest_first};
pub use types::{
    AirQuality, Astro, Condition, Current, Day, Forecast, ForecastDay, Hour, LocationInfo,
    NumberOrString, WeatherResponse,
};
