//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use nimbus_types::{LocationQuery, WeatherSnapshot};

/// The latest snapshot stored for one location query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeatherRecord {
    /// Row identifier. Regenerated on every replace.
    pub id: String,
    /// Cache key. Unique across the table.
    pub location_query: LocationQuery,
    /// Display name reported by the upstream service.
    pub location_name: String,
    /// When the snapshot was fetched.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub weather_data: WeatherSnapshot,
}

/// One historical day stored for one location query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalWeatherRecord {
    pub id: String,
    /// Calendar day the snapshot describes.
    pub date: Date,
    pub location_query: LocationQuery,
    /// When the snapshot was fetched. Drives retention.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub weather_data: WeatherSnapshot,
}

/// Row counts for a quick look at the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub current_records: u64,
    pub historical_records: u64,
    pub saved_locations: u64,
}
