//! The `WeatherSnapshot` sum type.
//!
//! A forecast payload always carries current conditions and a sequence of
//! days; a historical payload carries exactly one past day and no current
//! block. Encoding the two shapes as separate variants makes the historical
//! invariant impossible to violate once a snapshot has been constructed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::{ParseError, ParseResult};
use crate::types::{Current, Forecast, ForecastDay, LocationInfo, WeatherResponse};

/// One fetched weather payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WeatherSnapshot {
    /// Current conditions plus an ordered multi-day forecast.
    CurrentAndForecast {
        location: LocationInfo,
        current: Current,
        forecast: Vec<ForecastDay>,
    },
    /// A single past day. Never carries current conditions.
    HistoricalOnly { location: LocationInfo, day: ForecastDay },
}

impl WeatherSnapshot {
    /// Build a forecast snapshot from a forecast endpoint response.
    pub fn forecast(response: WeatherResponse) -> ParseResult<Self> {
        let WeatherResponse {
            location,
            current,
            forecast,
        } = response;
        let current = current.ok_or_else(|| ParseError::MissingCurrent {
            location: location.name.clone(),
        })?;
        Ok(Self::CurrentAndForecast {
            location,
            current,
            forecast: forecast.days,
        })
    }

    /// Build a historical snapshot from a single-day history response.
    ///
    /// Any `current` block in the response is discarded.
    pub fn historical(response: WeatherResponse) -> ParseResult<Self> {
        let WeatherResponse {
            location, forecast, ..
        } = response;
        let actual = forecast.days.len();
        let mut days = forecast.days.into_iter();
        match (days.next(), days.next()) {
            (Some(day), None) => {
                day.calendar_date()?;
                Ok(Self::HistoricalOnly { location, day })
            }
            _ => Err(ParseError::HistoricalDayCount { actual }),
        }
    }

    /// Split a multi-day history response into one snapshot per day.
    ///
    /// Only days whose date appears in `wanted` are kept, and each date is
    /// emitted at most once: when the response repeats a day, the first
    /// occurrence wins. Days with unparseable dates are skipped.
    pub fn split_range(response: WeatherResponse, wanted: &HashSet<Date>) -> Vec<(Date, Self)> {
        let WeatherResponse {
            location, forecast, ..
        } = response;
        let mut processed = HashSet::new();
        let mut out = Vec::new();
        for day in forecast.days {
            let Ok(date) = day.calendar_date() else {
                continue;
            };
            if !wanted.contains(&date) || !processed.insert(date) {
                continue;
            }
            out.push((
                date,
                Self::HistoricalOnly {
                    location: location.clone(),
                    day,
                },
            ));
        }
        out
    }

    /// Location metadata for either variant.
    pub fn location(&self) -> &LocationInfo {
        match self {
            Self::CurrentAndForecast { location, .. } | Self::HistoricalOnly { location, .. } => {
                location
            }
        }
    }

    /// Display name of the resolved location.
    pub fn location_name(&self) -> &str {
        &self.location().name
    }

    /// Current conditions, if this is a forecast snapshot.
    pub fn current(&self) -> Option<&Current> {
        match self {
            Self::CurrentAndForecast { current, .. } => Some(current),
            Self::HistoricalOnly { .. } => None,
        }
    }

    /// Day entries in payload order.
    pub fn days(&self) -> &[ForecastDay] {
        match self {
            Self::CurrentAndForecast { forecast, .. } => forecast,
            Self::HistoricalOnly { day, .. } => std::slice::from_ref(day),
        }
    }

    /// The single day's date for a historical snapshot.
    pub fn historical_date(&self) -> Option<Date> {
        match self {
            Self::HistoricalOnly { day, .. } => day.calendar_date().ok(),
            Self::CurrentAndForecast { .. } => None,
        }
    }

    pub fn is_historical(&self) -> bool {
        matches!(self, Self::HistoricalOnly { .. })
    }

    /// Convert back into the wire shape.
    pub fn into_response(self) -> WeatherResponse {
        match self {
            Self::CurrentAndForecast {
                location,
                current,
                forecast,
            } => WeatherResponse {
                location,
                current: Some(current),
                forecast: Forecast { days: forecast },
            },
            Self::HistoricalOnly { location, day } => WeatherResponse {
                location,
                current: None,
                forecast: Forecast { days: vec![day] },
            },
        }
    }
}

/// Sort historical snapshots by date, newest first.
///
/// Forecast snapshots, which have no single date, sort last.
pub fn sort_newest_first(snapshots: &mut [WeatherSnapshot]) {
    snapshots.sort_by(|a, b| b.historical_date().cmp(&a.historical_date()));
}

/// Signal that the data on screen came from a cache rather than the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineDataInfo {
    pub location_name: String,
    /// When the cached snapshot was originally fetched.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub is_offline: bool,
}

impl OfflineDataInfo {
    pub fn new(location_name: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            location_name: location_name.into(),
            timestamp,
            is_offline: true,
        }
    }

    /// Age of the cached data relative to `now`.
    pub fn age(&self, now: OffsetDateTime) -> time::Duration {
        now - self.timestamp
    }
}

/// A snapshot plus when it was fetched and whether it was served from cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedWeather {
    pub snapshot: WeatherSnapshot,
    pub timestamp: OffsetDateTime,
    pub from_cache: bool,
}

impl CachedWeather {
    pub fn fresh(snapshot: WeatherSnapshot, timestamp: OffsetDateTime) -> Self {
        Self {
            snapshot,
            timestamp,
            from_cache: false,
        }
    }

    /// Mark this entry as having been served from a cache.
    pub fn into_cached(mut self) -> Self {
        self.from_cache = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{day, response};
    use time::macros::date;

    #[test]
    fn test_forecast_requires_current() {
        let mut resp = response(&["2024-03-01"], true);
        assert!(WeatherSnapshot::forecast(resp.clone()).is_ok());
        resp.current = None;
        let err = WeatherSnapshot::forecast(resp).unwrap_err();
        assert!(matches!(err, ParseError::MissingCurrent { .. }));
    }

    #[test]
    fn test_historical_drops_current_and_requires_one_day() {
        let snapshot = WeatherSnapshot::historical(response(&["2024-03-01"], true)).unwrap();
        assert!(snapshot.current().is_none());
        assert_eq!(snapshot.historical_date(), Some(date!(2024 - 03 - 01)));
        assert!(snapshot.into_response().current.is_none());

        let err = WeatherSnapshot::historical(response(&["2024-03-01", "2024-03-02"], false))
            .unwrap_err();
        assert_eq!(err, ParseError::HistoricalDayCount { actual: 2 });
        let err = WeatherSnapshot::historical(response(&[], false)).unwrap_err();
        assert_eq!(err, ParseError::HistoricalDayCount { actual: 0 });
    }

    #[test]
    fn test_split_range_first_seen_wins() {
        let mut resp = response(&["2024-03-01", "2024-03-02", "2024-03-03"], false);
        let mut dup = day("2024-03-02");
        dup.day.max_temp_c = 99.0;
        resp.forecast.days.push(dup);

        let wanted: HashSet<Date> = [date!(2024 - 03 - 02), date!(2024 - 03 - 03)].into();
        let split = WeatherSnapshot::split_range(resp, &wanted);

        assert_eq!(split.len(), 2);
        assert_eq!(split[0].0, date!(2024 - 03 - 02));
        assert_ne!(split[0].1.days()[0].day.max_temp_c, 99.0);
        assert!(split.iter().all(|(_, s)| s.is_historical()));
    }

    #[test]
    fn test_sort_newest_first() {
        let mut snaps: Vec<_> = ["2024-03-02", "2024-03-05", "2024-03-01"]
            .iter()
            .map(|d| WeatherSnapshot::historical(response(&[d], false)).unwrap())
            .collect();
        sort_newest_first(&mut snaps);
        let order: Vec<_> = snaps.iter().filter_map(|s| s.historical_date()).collect();
        assert_eq!(
            order,
            vec![date!(2024 - 03 - 05), date!(2024 - 03 - 02), date!(2024 - 03 - 01)]
        );
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = WeatherSnapshot::forecast(response(&["2024-03-01"], true)).unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"kind\":\"current_and_forecast\""));
        let back: WeatherSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_offline_info_age() {
        let ts = time::macros::datetime!(2024-03-01 10:00 UTC);
        let info = OfflineDataInfo::new("Paris", ts);
        assert!(info.is_offline);
        assert_eq!(info.age(ts + time::Duration::minutes(5)), time::Duration::minutes(5));
    }
}
