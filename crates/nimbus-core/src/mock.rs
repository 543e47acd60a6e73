//! Mock collaborators for testing.
//!
//! Every trait in [`crate::traits`] has an in-memory implementation here so
//! the engine and scheduler can be exercised without a network, a GPS fix
//! or a battery.
//!
//! # Features
//!
//! - **Failure injection**: fail forecasts, range requests or specific days
//! - **Latency simulation**: delay API calls and position lookups
//! - **Call recording**: inspect every API call, with the instant it was made

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use time::macros::date;
use time::{Date, OffsetDateTime};

use nimbus_types::dates::{dates_in_range, format_date};
use nimbus_types::{LocationQuery, WeatherResponse, fixtures};

use crate::error::{Error, Result};
use crate::traits::{BatteryMonitor, Clock, LocationProvider, NetworkMonitor, Position, WeatherApi};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kind of failure a mock call should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Connectivity,
    Timeout,
    Upstream(u16),
    Decode,
}

impl MockFailure {
    fn to_error(self) -> Error {
        match self {
            Self::Connectivity => Error::Connectivity("mock network unreachable".to_string()),
            Self::Timeout => Error::timeout("mock request", Duration::from_secs(15)),
            Self::Upstream(status) => Error::Upstream {
                status,
                message: "mock upstream failure".to_string(),
            },
            Self::Decode => Error::Decode("mock malformed body".to_string()),
        }
    }
}

/// A call received by [`MockWeatherApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Forecast {
        query: String,
        days: u32,
        air_quality: bool,
    },
    Historical {
        query: String,
        date: Date,
        end_date: Option<Date>,
        at: tokio::time::Instant,
    },
}

/// An in-memory weather service.
///
/// Responses are built from [`nimbus_types::fixtures`] with the query string
/// as location name. Forecasts start on `2024-03-10`.
#[derive(Debug)]
pub struct MockWeatherApi {
    calls: Mutex<Vec<ApiCall>>,
    forecast_failure: Mutex<Option<MockFailure>>,
    range_failure: Mutex<Option<MockFailure>>,
    failing_dates: Mutex<HashSet<Date>>,
    range_extra_dates: Mutex<Vec<Date>>,
    latency_ms: AtomicU64,
    forecast_count: AtomicU32,
    history_count: AtomicU32,
}

impl Default for MockWeatherApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWeatherApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            forecast_failure: Mutex::new(None),
            range_failure: Mutex::new(None),
            failing_dates: Mutex::new(HashSet::new()),
            range_extra_dates: Mutex::new(Vec::new()),
            latency_ms: AtomicU64::new(0),
            forecast_count: AtomicU32::new(0),
            history_count: AtomicU32::new(0),
        }
    }

    /// Make forecast calls fail, or succeed again with `None`.
    pub fn fail_forecast(&self, failure: Option<MockFailure>) {
        *lock(&self.forecast_failure) = failure;
    }

    /// Make multi-day history calls fail, or succeed again with `None`.
    pub fn fail_range(&self, failure: Option<MockFailure>) {
        *lock(&self.range_failure) = failure;
    }

    /// Make single-day history calls for `date` fail.
    pub fn fail_date(&self, date: Date) {
        lock(&self.failing_dates).insert(date);
    }

    /// Append these days to every range response, after the requested ones.
    pub fn add_range_extra_dates(&self, dates: &[Date]) {
        lock(&self.range_extra_dates).extend_from_slice(dates);
    }

    /// Simulated latency per call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.calls).clone()
    }

    /// Only the history calls, in order.
    pub fn historical_calls(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::Historical { .. }))
            .collect()
    }

    pub fn forecast_calls(&self) -> u32 {
        self.forecast_count.load(Ordering::Relaxed)
    }

    pub fn history_calls(&self) -> u32 {
        self.history_count.load(Ordering::Relaxed)
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
        self.forecast_count.store(0, Ordering::Relaxed);
        self.history_count.store(0, Ordering::Relaxed);
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl WeatherApi for MockWeatherApi {
    async fn fetch_forecast(
        &self,
        query: &LocationQuery,
        days: u32,
        include_air_quality: bool,
    ) -> Result<WeatherResponse> {
        self.forecast_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.calls).push(ApiCall::Forecast {
            query: query.to_string(),
            days,
            air_quality: include_air_quality,
        });
        self.simulate_latency().await;

        if let Some(failure) = *lock(&self.forecast_failure) {
            return Err(failure.to_error());
        }

        let start = date!(2024 - 03 - 10);
        let end = start
            .checked_add(time::Duration::days(i64::from(days.max(1)) - 1))
            .unwrap_or(start);
        let labels: Vec<String> = dates_in_range(start, end).into_iter().map(format_date).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        Ok(fixtures::named_response(query.as_str(), &labels, true))
    }

    async fn fetch_historical(
        &self,
        query: &LocationQuery,
        date: Date,
        end_date: Option<Date>,
    ) -> Result<WeatherResponse> {
        self.history_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.calls).push(ApiCall::Historical {
            query: query.to_string(),
            date,
            end_date,
            at: tokio::time::Instant::now(),
        });
        self.simulate_latency().await;

        let days = match end_date {
            Some(end) => {
                if let Some(failure) = *lock(&self.range_failure) {
                    return Err(failure.to_error());
                }
                let mut days = dates_in_range(date, end);
                days.extend(lock(&self.range_extra_dates).iter().copied());
                days
            }
            None => {
                if lock(&self.failing_dates).contains(&date) {
                    return Err(MockFailure::Upstream(500).to_error());
                }
                vec![date]
            }
        };

        let labels: Vec<String> = days.into_iter().map(format_date).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        Ok(fixtures::named_response(query.as_str(), &labels, false))
    }
}

/// Network reachability toggle.
#[derive(Debug)]
pub struct MockNetwork {
    connected: AtomicBool,
    checks: AtomicU32,
}

impl MockNetwork {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            checks: AtomicU32::new(0),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Number of times reachability was queried.
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NetworkMonitor for MockNetwork {
    async fn is_connected(&self) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.connected.load(Ordering::Relaxed)
    }
}

/// Device position with failure and latency injection.
#[derive(Debug)]
pub struct MockLocationProvider {
    position: Mutex<Position>,
    should_fail: AtomicBool,
    latency_ms: AtomicU64,
    current_calls: AtomicU32,
    fresh_calls: AtomicU32,
}

impl MockLocationProvider {
    pub fn at(position: Position) -> Self {
        Self {
            position: Mutex::new(position),
            should_fail: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            current_calls: AtomicU32::new(0),
            fresh_calls: AtomicU32::new(0),
        }
    }

    pub fn set_position(&self, position: Position) {
        *lock(&self.position) = position;
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn current_calls(&self) -> u32 {
        self.current_calls.load(Ordering::Relaxed)
    }

    pub fn fresh_calls(&self) -> u32 {
        self.fresh_calls.load(Ordering::Relaxed)
    }

    async fn lookup(&self) -> Result<Position> {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.should_fail.load(Ordering::Relaxed) {
            return Err(Error::Connectivity("mock position unavailable".to_string()));
        }
        Ok(*lock(&self.position))
    }
}

#[async_trait]
impl LocationProvider for MockLocationProvider {
    async fn current_position(&self) -> Result<Position> {
        self.current_calls.fetch_add(1, Ordering::Relaxed);
        self.lookup().await
    }

    async fn fresh_position(&self) -> Result<Position> {
        self.fresh_calls.fetch_add(1, Ordering::Relaxed);
        self.lookup().await
    }
}

/// Settable battery level.
#[derive(Debug)]
pub struct MockBattery {
    level: Mutex<Option<f32>>,
}

impl MockBattery {
    pub fn new(level: Option<f32>) -> Self {
        Self {
            level: Mutex::new(level),
        }
    }

    pub fn set_level(&self, level: Option<f32>) {
        *lock(&self.level) = level;
    }
}

#[async_trait]
impl BatteryMonitor for MockBattery {
    async fn charge_fraction(&self) -> Option<f32> {
        *lock(&self.level)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *lock(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_forecast_response_shape() {
        let api = MockWeatherApi::new();
        let response = api.fetch_forecast(&"Oslo".into(), 3, true).await.unwrap();
        assert_eq!(response.location.name, "Oslo");
        assert!(response.current.is_some());
        assert_eq!(response.dates(), vec!["2024-03-10", "2024-03-11", "2024-03-12"]);
        assert_eq!(api.forecast_calls(), 1);
    }

    #[tokio::test]
    async fn test_range_response_with_extras() {
        let api = MockWeatherApi::new();
        api.add_range_extra_dates(&[date!(2024 - 03 - 01)]);
        let response = api
            .fetch_historical(&"Oslo".into(), date!(2024 - 03 - 03), Some(date!(2024 - 03 - 04)))
            .await
            .unwrap();
        assert!(response.current.is_none());
        assert_eq!(response.dates(), vec!["2024-03-03", "2024-03-04", "2024-03-01"]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let api = MockWeatherApi::new();
        api.fail_range(Some(MockFailure::Timeout));
        api.fail_date(date!(2024 - 03 - 03));

        let q: LocationQuery = "Oslo".into();
        let range = api
            .fetch_historical(&q, date!(2024 - 03 - 03), Some(date!(2024 - 03 - 04)))
            .await;
        assert!(matches!(range, Err(Error::Timeout { .. })));
        assert!(api.fetch_historical(&q, date!(2024 - 03 - 03), None).await.is_err());
        assert!(api.fetch_historical(&q, date!(2024 - 03 - 04), None).await.is_ok());
        assert_eq!(api.historical_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_location_provider_counts() {
        let provider = MockLocationProvider::at(Position::new(1.0, 2.0));
        provider.current_position().await.unwrap();
        provider.fresh_position().await.unwrap();
        provider.set_should_fail(true);
        assert!(provider.fresh_position().await.is_err());
        assert_eq!(provider.current_calls(), 1);
        assert_eq!(provider.fresh_calls(), 2);
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::new(datetime!(2024-03-10 23:30 UTC));
        clock.advance(time::Duration::hours(1));
        assert_eq!(clock.today(), date!(2024 - 03 - 11));
    }
}
