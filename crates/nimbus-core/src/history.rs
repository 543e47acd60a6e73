//! Historical weather gap-fill.
//!
//! A request for the last `N` days is answered from the persistent store
//! wherever possible. Only the days missing from the store are fetched:
//!
//! 1. Evict rows fetched longer ago than the retention period.
//! 2. Read the cached rows for `[today - N, today - 1]`. If there are at
//!    least `N`, no request is made.
//! 3. Otherwise request every missing day with a single range call spanning
//!    the first and last missing date, keeping only the days that were
//!    actually missing.
//! 4. If the range call fails, request the missing days one at a time in
//!    ascending order, pausing between requests. Days that fail are
//!    skipped.
//!
//! The merged result is sorted newest first and published on
//! [`WeatherEngine::historical_data`].

use std::collections::HashSet;

use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use nimbus_types::dates::{MAX_HISTORY_DAYS, format_date, historical_window, range_label};
use nimbus_types::{LocationQuery, ParseError, WeatherSnapshot, sort_newest_first};

use crate::engine::WeatherEngine;
use crate::error::{Error, Result};
use crate::events::WeatherEvent;

/// Default number of past days shown.
pub const DEFAULT_HISTORY_DAYS: u32 = 7;

impl WeatherEngine {
    /// Past `days` days of weather for the selected location, newest first.
    ///
    /// Partial results are a success: days that could not be fetched are
    /// simply absent.
    pub async fn get_historical_weather(&self, days: u32) -> Result<Vec<WeatherSnapshot>> {
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(Error::invalid_config(format!(
                "history window must be 1..={} days, got {}",
                MAX_HISTORY_DAYS, days
            )));
        }

        self.evict_expired_history().await;

        let selected = self.registry().selected();
        let query = self.resolve_query(Some(&selected)).await;
        let window = historical_window(self.clock.today(), days);
        let (Some(&start), Some(&end)) = (window.first(), window.last()) else {
            return Ok(Vec::new());
        };

        let cached = {
            let store = self.store.lock().await;
            store.get_historical_in_range(&query, start, end)
        };
        let cached = cached.unwrap_or_else(|e| {
            warn!("Failed to read cached history for '{}': {}", query, e);
            Vec::new()
        });

        let mut snapshots = if cached.len() >= days as usize {
            debug!(
                "History for '{}' {} fully cached",
                query,
                range_label(start, end)
            );
            cached.into_iter().map(|r| r.weather_data).collect::<Vec<_>>()
        } else {
            let have: HashSet<Date> = cached.iter().map(|r| r.date).collect();
            let missing: Vec<Date> = window.into_iter().filter(|d| !have.contains(d)).collect();
            info!(
                "History for '{}': {} cached, {} missing",
                query,
                cached.len(),
                missing.len()
            );
            let fetched = self.fill_gaps(&query, &missing).await;
            cached
                .into_iter()
                .map(|r| r.weather_data)
                .chain(fetched)
                .collect()
        };

        sort_newest_first(&mut snapshots);
        self.history_tx.send_replace(snapshots.clone());
        self.events.send(WeatherEvent::HistoryUpdated {
            location_query: query.to_string(),
            days: snapshots.len(),
        });

        Ok(snapshots)
    }

    /// Delete historical rows fetched before `now - retention`.
    ///
    /// Best effort: failures are logged and never surface to the caller.
    pub async fn evict_expired_history(&self) {
        let cutoff = self.clock.now() - self.options.retention;
        let store = self.store.lock().await;
        match store.table_exists("historical_weather") {
            Ok(true) => match store.delete_historical_older_than(cutoff) {
                Ok(0) => {}
                Ok(n) => info!("Evicted {} expired historical rows", n),
                Err(e) => warn!("Historical eviction failed: {}", e),
            },
            Ok(false) => debug!("Historical table not ready, skipping eviction"),
            Err(e) => warn!("Historical eviction failed: {}", e),
        }
    }

    async fn fill_gaps(&self, query: &LocationQuery, missing: &[Date]) -> Vec<WeatherSnapshot> {
        if missing.is_empty() {
            return Vec::new();
        }
        match self.fetch_range(query, missing).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(
                    "Range request for '{}' failed ({}), fetching {} days individually",
                    query,
                    e,
                    missing.len()
                );
                self.fetch_each(query, missing).await
            }
        }
    }

    #[tracing::instrument(skip(self, missing), fields(query = %query, days = missing.len()))]
    async fn fetch_range(
        &self,
        query: &LocationQuery,
        missing: &[Date],
    ) -> Result<Vec<WeatherSnapshot>> {
        let (Some(&first), Some(&last)) = (missing.first(), missing.last()) else {
            return Ok(Vec::new());
        };

        let response = self.api.fetch_historical(query, first, Some(last)).await?;
        let wanted: HashSet<Date> = missing.iter().copied().collect();
        let now = self.clock.now();

        let mut snapshots = Vec::with_capacity(missing.len());
        for (date, snapshot) in WeatherSnapshot::split_range(response, &wanted) {
            self.persist_historical(date, query, &snapshot, now).await;
            snapshots.push(snapshot);
        }
        debug!(
            "Range {} returned {} of {} missing days",
            range_label(first, last),
            snapshots.len(),
            missing.len()
        );
        Ok(snapshots)
    }

    async fn fetch_each(&self, query: &LocationQuery, missing: &[Date]) -> Vec<WeatherSnapshot> {
        let mut snapshots = Vec::with_capacity(missing.len());
        for (i, &date) in missing.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.options.request_spacing).await;
            }
            match self.fetch_day(query, date).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!("Skipping {} for '{}': {}", format_date(date), query, e),
            }
        }
        snapshots
    }

    async fn fetch_day(&self, query: &LocationQuery, date: Date) -> Result<WeatherSnapshot> {
        let response = self.api.fetch_historical(query, date, None).await?;
        let snapshot = WeatherSnapshot::historical(response)?;
        if snapshot.historical_date() != Some(date) {
            return Err(ParseError::InvalidData(format!(
                "requested {} but received {:?}",
                format_date(date),
                snapshot.historical_date().map(format_date)
            ))
            .into());
        }
        self.persist_historical(date, query, &snapshot, self.clock.now())
            .await;
        Ok(snapshot)
    }

    async fn persist_historical(
        &self,
        date: Date,
        query: &LocationQuery,
        snapshot: &WeatherSnapshot,
        fetched_at: OffsetDateTime,
    ) {
        let store = self.store.lock().await;
        if let Err(e) = store.upsert_historical(date, query, snapshot, fetched_at) {
            warn!(
                "Failed to persist history for '{}' on {}: {}",
                query,
                format_date(date),
                e
            );
        }
    }
}
