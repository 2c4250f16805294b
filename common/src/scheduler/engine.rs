// Scheduler engine implementation
// One-shot absolute-time timers, fired on detached tokio tasks

use crate::errors::ArmError;
use crate::models::JobId;
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, instrument, warn};

/// Work run once when a trigger fires
pub type FireCallback = Box<dyn FnOnce(JobId) -> BoxFuture<'static, ()> + Send + 'static>;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest the timer task sleeps before re-checking the registry
    pub poll_interval_ms: u64,
    /// Maximum number of simultaneously armed triggers, 0 for unlimited
    pub max_armed_triggers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_armed_triggers: 0,
        }
    }
}

impl From<&crate::config::SchedulerConfig> for SchedulerConfig {
    fn from(config: &crate::config::SchedulerConfig) -> Self {
        Self {
            poll_interval_ms: config.poll_interval_ms,
            max_armed_triggers: config.max_armed_triggers,
        }
    }
}

/// Scheduler trait for one-shot trigger registration
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Register `callback` to run once at or after `fire_at`.
    /// A `fire_at` in the past fires as soon as possible.
    async fn arm(&self, fire_at: DateTime<Utc>, callback: FireCallback) -> Result<JobId, ArmError>;

    /// Register a previously persisted trigger under its existing id
    async fn rearm(
        &self,
        job_id: JobId,
        fire_at: DateTime<Utc>,
        callback: FireCallback,
    ) -> Result<(), ArmError>;

    /// Drop an armed trigger that has not fired yet. Returns whether it was found.
    async fn disarm(&self, job_id: JobId) -> bool;

    /// Make sure the background timer task is running
    fn ensure_running(&self);

    /// Stop firing and reject further arms
    async fn stop(&self);

    /// Number of triggers waiting to fire
    async fn armed_count(&self) -> usize;
}

#[derive(Default)]
struct Registry {
    /// Ordered by fire time, then id
    armed: BTreeMap<(DateTime<Utc>, JobId), FireCallback>,
    fire_times: HashMap<JobId, DateTime<Utc>>,
}

impl Registry {
    fn insert(&mut self, job_id: JobId, fire_at: DateTime<Utc>, callback: FireCallback) {
        self.armed.insert((fire_at, job_id), callback);
        self.fire_times.insert(job_id, fire_at);
    }

    fn remove(&mut self, job_id: JobId) -> bool {
        match self.fire_times.remove(&job_id) {
            Some(fire_at) => self.armed.remove(&(fire_at, job_id)).is_some(),
            None => false,
        }
    }

    /// Pop every trigger due at `now`, earliest first
    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<(JobId, DateTime<Utc>, FireCallback)> {
        let mut due = Vec::new();
        while let Some(entry) = self.armed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((fire_at, job_id), callback) = entry.remove_entry();
            self.fire_times.remove(&job_id);
            due.push((job_id, fire_at, callback));
        }
        due
    }

    fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.armed.keys().next().map(|(fire_at, _)| *fire_at)
    }
}

struct Inner {
    config: SchedulerConfig,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    wake: Notify,
    running: AtomicBool,
    stopped: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

/// In-process scheduler holding the live set of armed triggers
///
/// Cloning is cheap; clones share the same registry and timer task.
#[derive(Clone)]
pub struct SchedulerEngine {
    inner: Arc<Inner>,
}

impl SchedulerEngine {
    /// Create a new scheduler engine. The timer task starts on
    /// [`Scheduler::ensure_running`].
    pub fn new(config: SchedulerConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            inner: Arc::new(Inner {
                config,
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
                wake: Notify::new(),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    /// Ensure ids handed out from now on are greater than `last_used`
    pub fn seed_job_ids(&self, last_used: JobId) {
        self.inner
            .next_id
            .fetch_max(last_used.get().saturating_add(1), Ordering::SeqCst);
    }

    /// Fire every trigger that is due now. Returns how many were fired.
    pub async fn fire_due(&self) -> usize {
        self.inner.fire_due().await
    }

    fn check_accepting(&self, registry: &Registry) -> Result<(), ArmError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(ArmError::SchedulerStopped);
        }
        let limit = self.inner.config.max_armed_triggers;
        if limit > 0 && registry.armed.len() >= limit {
            return Err(ArmError::CapacityExceeded { limit });
        }
        Ok(())
    }
}

impl Inner {
    async fn fire_due(&self) -> usize {
        let (due, remaining) = {
            let mut registry = self.registry.lock().await;
            let due = registry.take_due(Utc::now());
            (due, registry.armed.len())
        };

        let fired = due.len();
        for (job_id, fire_at, callback) in due {
            info!(job_id = %job_id, fire_at = %fire_at, "Trigger fired");
            // Each trigger runs on its own task so a slow dispatch never delays the next one
            tokio::spawn(callback(job_id));
        }

        if fired > 0 {
            telemetry::update_pending_triggers(remaining);
        }
        fired
    }

    async fn time_until_next(&self) -> Duration {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let next = self.registry.lock().await.next_fire_time();

        match next {
            Some(fire_at) => (fire_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(poll_interval),
            None => poll_interval,
        }
    }

    async fn run(self: Arc<Self>) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting scheduler timer task"
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let fired = self.fire_due().await;
            if fired > 0 {
                debug!(fired, "Dispatched due triggers");
            }
            let wait = self.time_until_next().await;

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {
                    debug!("Scheduler woken by new trigger");
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        info!("Scheduler timer task stopped");
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self, callback))]
    async fn arm(&self, fire_at: DateTime<Utc>, callback: FireCallback) -> Result<JobId, ArmError> {
        let armed = {
            let mut registry = self.inner.registry.lock().await;
            self.check_accepting(&registry)?;

            let job_id = JobId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
            registry.insert(job_id, fire_at, callback);
            (job_id, registry.armed.len())
        };
        let (job_id, pending) = armed;

        self.inner.wake.notify_one();
        telemetry::update_pending_triggers(pending);

        if fire_at <= Utc::now() {
            debug!(job_id = %job_id, "Fire time already passed, firing as soon as possible");
        }
        debug!(job_id = %job_id, "Trigger armed");
        Ok(job_id)
    }

    #[instrument(skip(self, callback))]
    async fn rearm(
        &self,
        job_id: JobId,
        fire_at: DateTime<Utc>,
        callback: FireCallback,
    ) -> Result<(), ArmError> {
        let pending = {
            let mut registry = self.inner.registry.lock().await;
            self.check_accepting(&registry)?;
            if registry.fire_times.contains_key(&job_id) {
                return Err(ArmError::DuplicateJobId(job_id.get()));
            }

            registry.insert(job_id, fire_at, callback);
            registry.armed.len()
        };

        self.seed_job_ids(job_id);
        self.inner.wake.notify_one();
        telemetry::update_pending_triggers(pending);

        debug!(job_id = %job_id, "Trigger re-armed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn disarm(&self, job_id: JobId) -> bool {
        let (removed, pending) = {
            let mut registry = self.inner.registry.lock().await;
            let removed = registry.remove(job_id);
            (removed, registry.armed.len())
        };

        if removed {
            telemetry::update_pending_triggers(pending);
            debug!(job_id = %job_id, "Trigger disarmed");
        } else {
            warn!(job_id = %job_id, "Trigger to disarm was not armed (already fired?)");
        }
        removed
    }

    fn ensure_running(&self) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        if !self.inner.running.swap(true, Ordering::SeqCst) {
            tokio::spawn(self.inner.clone().run());
        }
    }

    #[instrument(skip(self))]
    async fn stop(&self) {
        info!("Stopping scheduler engine");
        self.inner.stopped.store(true, Ordering::SeqCst);
        let _ = self.inner.shutdown_tx.send(());

        let dropped = {
            let mut registry = self.inner.registry.lock().await;
            let dropped = registry.armed.len();
            *registry = Registry::default();
            dropped
        };
        if dropped > 0 {
            warn!(dropped, "Scheduler stopped with armed triggers still pending");
        }
        telemetry::update_pending_triggers(0);
    }

    async fn armed_count(&self) -> usize {
        self.inner.registry.lock().await.armed.len()
    }
}
