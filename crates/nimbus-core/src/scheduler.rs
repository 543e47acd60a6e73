//! Named periodic jobs with a network gate and retry backoff.
//!
//! Each job name owns one long-lived task. Re-enqueueing an existing name
//! updates its spec in place (or does nothing if the spec is unchanged), so
//! at most one instance of a job ever runs.
//!
//! Per tick the task:
//! - waits until the network is reachable if the job requires it
//! - runs the worker, retrying with backoff while it asks for a retry
//! - sleeps until one interval after the tick started
//!
//! A panicking worker is treated as asking for a retry.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::retry::RetryConfig;
use crate::traits::NetworkMonitor;

/// How often a network-gated job re-checks reachability while offline.
pub const DEFAULT_NETWORK_POLL: Duration = Duration::from_secs(30);

/// Scheduling parameters for one named job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    pub interval: Duration,
    pub requires_network: bool,
    pub network_poll: Duration,
    pub retry: RetryConfig,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            requires_network: false,
            network_poll: DEFAULT_NETWORK_POLL,
            retry: RetryConfig::none(),
        }
    }

    #[must_use]
    pub fn requires_network(mut self, required: bool) -> Self {
        self.requires_network = required;
        self
    }

    #[must_use]
    pub fn network_poll(mut self, poll: Duration) -> Self {
        self.network_poll = poll;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Result of a single worker run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    /// Transient failure; run again after a backoff delay.
    Retry,
    /// Permanent failure for this tick; wait for the next one.
    Failure,
}

/// Body of a periodic job.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self) -> WorkOutcome;
}

/// What [`JobRunner::enqueue`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job task was started.
    Scheduled,
    /// The running job picked up a changed spec.
    Updated,
    /// The running job already had this exact spec.
    Unchanged,
}

struct JobHandle {
    spec_tx: watch::Sender<JobSpec>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Runs named periodic jobs on the tokio runtime.
pub struct JobRunner {
    network: Arc<dyn NetworkMonitor>,
    jobs: Mutex<HashMap<String, JobHandle>>,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(network: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            network,
            jobs: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobHandle>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule `worker` under `spec.name`, or update the running job.
    ///
    /// When the name is already running its worker is kept and only the
    /// spec is replaced; a new interval applies from the current tick.
    pub fn enqueue(&self, spec: JobSpec, worker: Arc<dyn Worker>) -> EnqueueOutcome {
        let mut jobs = self.jobs();

        if let Some(handle) = jobs.get(&spec.name)
            && !handle.task.is_finished()
            && !handle.cancel.is_cancelled()
        {
            let changed = handle.spec_tx.send_if_modified(|current| {
                if *current == spec {
                    false
                } else {
                    *current = spec.clone();
                    true
                }
            });
            return if changed {
                info!("Updated job '{}' (interval {:?})", spec.name, spec.interval);
                EnqueueOutcome::Updated
            } else {
                debug!("Job '{}' unchanged", spec.name);
                EnqueueOutcome::Unchanged
            };
        }

        let name = spec.name.clone();
        let cancel = self.shutdown.child_token();
        let (spec_tx, spec_rx) = watch::channel(spec);
        let task = tokio::spawn(run_job(
            spec_rx,
            worker,
            Arc::clone(&self.network),
            cancel.clone(),
        ));

        info!("Scheduled job '{}'", name);
        jobs.insert(
            name,
            JobHandle {
                spec_tx,
                cancel,
                task,
            },
        );
        EnqueueOutcome::Scheduled
    }

    /// Cancel the named job, abandoning any in-flight run.
    pub fn cancel(&self, name: &str) -> bool {
        match self.jobs().remove(name) {
            Some(handle) => {
                handle.cancel.cancel();
                info!("Cancelled job '{}'", name);
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs()
            .get(name)
            .is_some_and(|h| !h.task.is_finished() && !h.cancel.is_cancelled())
    }

    /// The spec the named job is currently running with.
    pub fn spec(&self, name: &str) -> Option<JobSpec> {
        self.jobs().get(name).map(|h| h.spec_tx.borrow().clone())
    }

    /// Cancel every job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.jobs().clear();
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_job(
    mut spec_rx: watch::Receiver<JobSpec>,
    worker: Arc<dyn Worker>,
    network: Arc<dyn NetworkMonitor>,
    cancel: CancellationToken,
) {
    loop {
        let tick_started = Instant::now();
        let spec = spec_rx.borrow_and_update().clone();

        if !run_tick(&spec, worker.as_ref(), network.as_ref(), &cancel).await {
            debug!("Job '{}' stopped", spec.name);
            return;
        }

        let mut next = tick_started + spec.interval;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(next) => break,
                changed = spec_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let interval = spec_rx.borrow_and_update().interval;
                    next = tick_started + interval;
                    debug!(
                        "Job '{}' rescheduled, next run in {:?}",
                        spec.name,
                        next.saturating_duration_since(Instant::now())
                    );
                }
            }
        }
    }
}

/// One tick including retries. Returns `false` once cancelled.
async fn run_tick(
    spec: &JobSpec,
    worker: &dyn Worker,
    network: &dyn NetworkMonitor,
    cancel: &CancellationToken,
) -> bool {
    let mut attempt = 0;
    loop {
        if spec.requires_network && !wait_for_network(spec, network, cancel).await {
            return false;
        }

        let run = AssertUnwindSafe(worker.run()).catch_unwind();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return false,
            result = run => result.unwrap_or_else(|_| {
                error!("Job '{}' panicked", spec.name);
                WorkOutcome::Retry
            }),
        };

        match outcome {
            WorkOutcome::Success => {
                debug!("Job '{}' succeeded", spec.name);
                return true;
            }
            WorkOutcome::Failure => {
                warn!("Job '{}' failed, waiting for next interval", spec.name);
                return true;
            }
            WorkOutcome::Retry if attempt < spec.retry.max_retries => {
                let delay = spec.retry.delay_for_attempt(attempt);
                attempt += 1;
                info!(
                    "Job '{}' retry {}/{} in {:?}",
                    spec.name, attempt, spec.retry.max_retries, delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            WorkOutcome::Retry => {
                warn!(
                    "Job '{}' gave up after {} retries",
                    spec.name, spec.retry.max_retries
                );
                return true;
            }
        }
    }
}

async fn wait_for_network(
    spec: &JobSpec,
    network: &dyn NetworkMonitor,
    cancel: &CancellationToken,
) -> bool {
    let mut logged = false;
    while !network.is_connected().await {
        if !logged {
            info!("Job '{}' waiting for network", spec.name);
            logged = true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(spec.network_poll) => {}
        }
    }
    !cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNetwork;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingWorker {
        runs: AtomicU32,
        outcome: WorkOutcome,
    }

    impl CountingWorker {
        fn new(outcome: WorkOutcome) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                outcome,
            })
        }

        fn runs(&self) -> u32 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Worker for CountingWorker {
        async fn run(&self) -> WorkOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    struct PanickingWorker {
        runs: AtomicU32,
    }

    #[async_trait]
    impl Worker for PanickingWorker {
        async fn run(&self) -> WorkOutcome {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                panic!("boom");
            }
            WorkOutcome::Success
        }
    }

    fn runner(connected: bool) -> (JobRunner, Arc<MockNetwork>) {
        let network = Arc::new(MockNetwork::new(connected));
        (JobRunner::new(network.clone()), network)
    }

    async fn advance(d: Duration) {
        tokio::time::sleep(d).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_interval() {
        let (runner, _) = runner(true);
        let worker = CountingWorker::new(WorkOutcome::Success);
        runner.enqueue(JobSpec::new("tick", Duration::from_secs(60)), worker.clone());

        advance(Duration::from_millis(1)).await;
        assert_eq!(worker.runs(), 1);
        advance(Duration::from_secs(60)).await;
        assert_eq!(worker.runs(), 2);
        advance(Duration::from_secs(60)).await;
        assert_eq!(worker.runs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_same_spec_is_noop() {
        let (runner, _) = runner(true);
        let worker = CountingWorker::new(WorkOutcome::Success);
        let spec = JobSpec::new("tick", Duration::from_secs(60));

        assert_eq!(runner.enqueue(spec.clone(), worker.clone()), EnqueueOutcome::Scheduled);
        assert_eq!(runner.enqueue(spec, worker.clone()), EnqueueOutcome::Unchanged);

        advance(Duration::from_millis(1)).await;
        assert_eq!(worker.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_updates_interval() {
        let (runner, _) = runner(true);
        let worker = CountingWorker::new(WorkOutcome::Success);
        runner.enqueue(JobSpec::new("tick", Duration::from_secs(60)), worker.clone());
        advance(Duration::from_millis(1)).await;

        let outcome = runner.enqueue(JobSpec::new("tick", Duration::from_secs(120)), worker.clone());
        assert_eq!(outcome, EnqueueOutcome::Updated);
        assert_eq!(runner.spec("tick").unwrap().interval, Duration::from_secs(120));

        advance(Duration::from_secs(61)).await;
        assert_eq!(worker.runs(), 1);
        advance(Duration::from_secs(60)).await;
        assert_eq!(worker.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_bounded() {
        let (runner, _) = runner(true);
        let worker = CountingWorker::new(WorkOutcome::Retry);
        let retry = RetryConfig::new(2)
            .initial_delay(Duration::from_secs(1))
            .jitter(false);
        runner.enqueue(
            JobSpec::new("flaky", Duration::from_secs(3600)).retry(retry),
            worker.clone(),
        );

        advance(Duration::from_millis(1)).await;
        assert_eq!(worker.runs(), 1);
        advance(Duration::from_secs(1)).await;
        assert_eq!(worker.runs(), 2);
        advance(Duration::from_secs(2)).await;
        assert_eq!(worker.runs(), 3);
        advance(Duration::from_secs(600)).await;
        assert_eq!(worker.runs(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_waits_for_next_interval() {
        let (runner, _) = runner(true);
        let worker = CountingWorker::new(WorkOutcome::Failure);
        runner.enqueue(
            JobSpec::new("bad", Duration::from_secs(60)).retry(RetryConfig::new(3)),
            worker.clone(),
        );

        advance(Duration::from_secs(30)).await;
        assert_eq!(worker.runs(), 1);
        advance(Duration::from_secs(31)).await;
        assert_eq!(worker.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_network() {
        let (runner, network) = runner(false);
        let worker = CountingWorker::new(WorkOutcome::Success);
        runner.enqueue(
            JobSpec::new("net", Duration::from_secs(600))
                .requires_network(true)
                .network_poll(Duration::from_secs(5)),
            worker.clone(),
        );

        advance(Duration::from_secs(12)).await;
        assert_eq!(worker.runs(), 0);

        network.set_connected(true);
        advance(Duration::from_secs(5)).await;
        assert_eq!(worker.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_job() {
        let (runner, _) = runner(true);
        let worker = CountingWorker::new(WorkOutcome::Success);
        runner.enqueue(JobSpec::new("tick", Duration::from_secs(60)), worker.clone());
        advance(Duration::from_millis(1)).await;

        assert!(runner.cancel("tick"));
        assert!(!runner.is_scheduled("tick"));
        assert!(!runner.cancel("tick"));

        advance(Duration::from_secs(600)).await;
        assert_eq!(worker.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_becomes_retry() {
        let (runner, _) = runner(true);
        let worker = Arc::new(PanickingWorker {
            runs: AtomicU32::new(0),
        });
        let retry = RetryConfig::new(1)
            .initial_delay(Duration::from_secs(1))
            .jitter(false);
        runner.enqueue(
            JobSpec::new("panicky", Duration::from_secs(3600)).retry(retry),
            worker.clone(),
        );

        advance(Duration::from_secs(2)).await;
        assert_eq!(worker.runs.load(Ordering::SeqCst), 2);
        assert!(runner.is_scheduled("panicky"));
    }
}
