//! Battery-aware periodic weather refresh.
//!
//! [`BackgroundRefresh`] keeps a single network-gated job named
//! [`REFRESH_JOB_NAME`] on a [`JobRunner`]. The interval is chosen from the
//! battery level each time the job is (re)scheduled, and every successful
//! refresh re-arms the job so a changed battery level takes effect.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::engine::WeatherEngine;
use crate::error::Error;
use crate::events::WeatherEvent;
use crate::retry::RetryConfig;
use crate::scheduler::{EnqueueOutcome, JobRunner, JobSpec, WorkOutcome, Worker};
use crate::traits::BatteryMonitor;

/// Name of the periodic refresh job.
pub const REFRESH_JOB_NAME: &str = "weather_refresh";

/// Interval and retry policy for background refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshPolicy {
    pub normal_interval: Duration,
    pub low_battery_interval: Duration,
    /// Charge fraction below which the low-battery interval applies.
    pub low_battery_threshold: f32,
    pub network_poll: Duration,
    pub retry: RetryConfig,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            normal_interval: Duration::from_secs(15 * 60),
            low_battery_interval: Duration::from_secs(20 * 60),
            low_battery_threshold: 0.75,
            network_poll: Duration::from_secs(30),
            retry: RetryConfig::for_refresh(),
        }
    }
}

impl RefreshPolicy {
    /// Interval for a battery at `charge`; unknown counts as full.
    pub fn interval_for(&self, charge: Option<f32>) -> Duration {
        match charge {
            Some(level) if level < self.low_battery_threshold => self.low_battery_interval,
            _ => self.normal_interval,
        }
    }
}

/// Observable refresh state.
#[derive(Debug, Clone)]
pub struct RefreshSignals {
    refreshing: Arc<watch::Sender<bool>>,
    last_refresh: Arc<watch::Sender<Option<OffsetDateTime>>>,
}

impl Default for RefreshSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignals {
    pub fn new() -> Self {
        Self {
            refreshing: Arc::new(watch::channel(false).0),
            last_refresh: Arc::new(watch::channel(None).0),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        *self.refreshing.borrow()
    }

    pub fn last_refresh(&self) -> Option<OffsetDateTime> {
        *self.last_refresh.borrow()
    }

    pub fn subscribe_refreshing(&self) -> watch::Receiver<bool> {
        self.refreshing.subscribe()
    }

    pub fn subscribe_last_refresh(&self) -> watch::Receiver<Option<OffsetDateTime>> {
        self.last_refresh.subscribe()
    }

    /// Mark a refresh as running until the guard is dropped.
    fn begin(&self) -> RefreshingGuard<'_> {
        self.refreshing.send_replace(true);
        RefreshingGuard { signals: self }
    }

    fn complete(&self, at: OffsetDateTime) {
        self.last_refresh.send_replace(Some(at));
    }
}

/// Clears `is_refreshing` on every exit path, including cancellation.
struct RefreshingGuard<'a> {
    signals: &'a RefreshSignals,
}

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        self.signals.refreshing.send_replace(false);
    }
}

/// Owner of the periodic refresh job.
pub struct BackgroundRefresh {
    engine: Arc<WeatherEngine>,
    battery: Arc<dyn BatteryMonitor>,
    runner: Arc<JobRunner>,
    policy: RefreshPolicy,
    signals: RefreshSignals,
    me: Weak<Self>,
}

impl BackgroundRefresh {
    /// Build the refresh owner and attach it to `engine` for re-arming.
    pub fn new(
        engine: Arc<WeatherEngine>,
        battery: Arc<dyn BatteryMonitor>,
        runner: Arc<JobRunner>,
        policy: RefreshPolicy,
    ) -> Arc<Self> {
        let refresh = Arc::new_cyclic(|me| Self {
            engine: Arc::clone(&engine),
            battery,
            runner,
            policy,
            signals: RefreshSignals::new(),
            me: me.clone(),
        });
        engine.attach_scheduler(&refresh);
        refresh
    }

    pub fn signals(&self) -> &RefreshSignals {
        &self.signals
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Interval the job would be scheduled with right now.
    pub async fn current_interval(&self) -> Duration {
        let charge = self.battery.charge_fraction().await;
        self.policy.interval_for(charge)
    }

    /// Schedule the refresh job, or update its interval if it is running.
    ///
    /// Idempotent: calling it again with an unchanged battery band leaves
    /// the running job untouched. Returns the chosen interval.
    pub async fn schedule_periodic_refresh(&self) -> Duration {
        let charge = self.battery.charge_fraction().await;
        let interval = self.policy.interval_for(charge);

        let spec = JobSpec::new(REFRESH_JOB_NAME, interval)
            .requires_network(true)
            .network_poll(self.policy.network_poll)
            .retry(self.policy.retry.clone());
        let worker = Arc::new(RefreshWorker {
            engine: Arc::clone(&self.engine),
            signals: self.signals.clone(),
            scheduler: self.me.clone(),
        });

        match self.runner.enqueue(spec, worker) {
            EnqueueOutcome::Scheduled | EnqueueOutcome::Updated => info!(
                "Weather refresh every {:?} (battery {})",
                interval,
                charge.map_or_else(|| "unknown".to_string(), |c| format!("{:.0}%", c * 100.0))
            ),
            EnqueueOutcome::Unchanged => {}
        }
        interval
    }

    /// Stop the periodic job, abandoning any in-flight refresh.
    pub fn cancel(&self) -> bool {
        self.runner.cancel(REFRESH_JOB_NAME)
    }

    pub fn is_scheduled(&self) -> bool {
        self.runner.is_scheduled(REFRESH_JOB_NAME)
    }
}

struct RefreshWorker {
    engine: Arc<WeatherEngine>,
    signals: RefreshSignals,
    scheduler: Weak<BackgroundRefresh>,
}

#[async_trait]
impl Worker for RefreshWorker {
    async fn run(&self) -> WorkOutcome {
        let _guard = self.signals.begin();

        let selected = self.engine.registry().selected();
        let follows_device = selected.is_sentinel();
        let result = if follows_device {
            self.engine.refresh_current_location_weather().await
        } else {
            self.engine.get_current_weather(Some(&selected)).await
        };

        match result {
            Ok(snapshot) => {
                let at = self.engine.now();
                self.signals.complete(at);
                if !follows_device {
                    // The device path re-arms and announces inside the engine
                    if let Some(scheduler) = self.scheduler.upgrade() {
                        scheduler.schedule_periodic_refresh().await;
                    }
                    self.engine.events.send(WeatherEvent::BackgroundRefresh { at });
                }
                info!("Refreshed weather for '{}'", snapshot.location_name());
                WorkOutcome::Success
            }
            Err(e) => self.classify(e),
        }
    }
}

impl RefreshWorker {
    fn classify(&self, e: Error) -> WorkOutcome {
        let will_retry = e.is_connectivity();
        self.engine.events.send(WeatherEvent::RefreshFailed {
            error: e.to_string(),
            will_retry,
        });
        if will_retry {
            warn!("Weather refresh failed, will retry: {}", e);
            WorkOutcome::Retry
        } else {
            error!("Weather refresh failed: {}", e);
            WorkOutcome::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_for_battery() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.interval_for(Some(1.0)), Duration::from_secs(900));
        assert_eq!(policy.interval_for(Some(0.75)), Duration::from_secs(900));
        assert_eq!(policy.interval_for(Some(0.74)), Duration::from_secs(1200));
        assert_eq!(policy.interval_for(Some(0.0)), Duration::from_secs(1200));
        assert_eq!(policy.interval_for(None), Duration::from_secs(900));
    }

    #[test]
    fn test_refreshing_guard_clears_flag() {
        let signals = RefreshSignals::new();
        let rx = signals.subscribe_refreshing();
        {
            let _guard = signals.begin();
            assert!(*rx.borrow());
        }
        assert!(!signals.is_refreshing());
    }

    #[test]
    fn test_complete_records_time() {
        let signals = RefreshSignals::new();
        assert!(signals.last_refresh().is_none());
        let at = time::macros::datetime!(2024-03-10 09:00 UTC);
        signals.complete(at);
        assert_eq!(signals.last_refresh(), Some(at));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn interval_never_below_normal(level in proptest::option::of(0.0f32..=1.0)) {
                let policy = RefreshPolicy::default();
                let interval = policy.interval_for(level);
                prop_assert!(interval >= policy.normal_interval);
                prop_assert!(
                    interval == policy.normal_interval
                        || interval == policy.low_battery_interval
                );
            }
        }
    }
}
