//! Trait abstractions for the engine's external collaborators.
//!
//! Every platform dependency the engine touches sits behind one of these
//! traits so that the host binary can plug in real adapters and tests can
//! plug in the mocks from [`crate::mock`].

use async_trait::async_trait;
use time::{Date, OffsetDateTime, UtcOffset};

use nimbus_types::{LocationQuery, WeatherResponse};

use crate::error::Result;

/// Remote weather service.
///
/// # Example
///
/// ```ignore
/// use nimbus_core::{WeatherApi, Result};
///
/// async fn print_today<A: WeatherApi>(api: &A) -> Result<()> {
///     let response = api.fetch_forecast(&"Oslo".into(), 1, false).await?;
///     println!("{}", response.location.name);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Current conditions plus a `days`-day forecast.
    async fn fetch_forecast(
        &self,
        query: &LocationQuery,
        days: u32,
        include_air_quality: bool,
    ) -> Result<WeatherResponse>;

    /// Historical weather for `date`, or for every day in `[date, end_date]`
    /// when `end_date` is given.
    async fn fetch_historical(
        &self,
        query: &LocationQuery,
        date: Date,
        end_date: Option<Date>,
    ) -> Result<WeatherResponse>;
}

/// Reports whether the network is currently reachable.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// A latitude/longitude pair from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn to_query(self) -> LocationQuery {
        LocationQuery::from_coordinates(self.latitude, self.longitude)
    }
}

/// Device position source.
///
/// Implementations may block for a long time; the engine bounds every call
/// with a timeout and falls back to a default place.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Best available position, possibly a cached fix.
    async fn current_position(&self) -> Result<Position>;

    /// A new fix, bypassing any cached value.
    async fn fresh_position(&self) -> Result<Position> {
        self.current_position().await
    }
}

/// Battery state of the host.
#[async_trait]
pub trait BatteryMonitor: Send + Sync {
    /// Charge as a fraction in `0.0..=1.0`, or `None` when unknown.
    async fn charge_fraction(&self) -> Option<f32>;
}

/// Source of "now", injected so that tests can pin the calendar.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// Today's local calendar date.
    fn today(&self) -> Date {
        self.now().date()
    }
}

/// Wall clock in the host's local offset, or UTC when that is unknown.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}
