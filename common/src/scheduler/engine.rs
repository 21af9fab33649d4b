// Scheduler engine: tick loop, rate-limited reconciliation and dispatch

use crate::config::SchedulerConfig;
use crate::db::repositories::TaskRegistry;
use crate::errors::SchedulerError;
use crate::models::ExecutionContext;
use crate::pipeline::TaskExecutor;
use crate::scheduler::clock::Clock;
use crate::scheduler::inflight::InFlightTracker;
use crate::scheduler::reconciler::{LiveSchedule, ReconcileReport};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Timing parameters for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the tick loop
    pub tick_interval: Duration,
    /// Minimum time between two reconciliations driven by the tick loop
    pub reconcile_interval: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            reconcile_interval: chrono::Duration::seconds(10),
        }
    }
}

impl From<&SchedulerConfig> for EngineConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            reconcile_interval: chrono::Duration::seconds(
                i64::try_from(config.reconcile_interval_seconds)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
        }
    }
}

/// Scheduler lifecycle
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Reconcile once, then run the tick loop until `stop` is called
    async fn start(&self) -> Result<(), SchedulerError>;

    /// Stop ticking and dispatching; in-flight runs are not awaited
    async fn stop(&self) -> Result<(), SchedulerError>;
}

struct EngineState {
    schedule: LiveSchedule,
    last_reconciled: Option<DateTime<Utc>>,
}

/// Single-process scheduler engine
pub struct SchedulerEngine {
    config: EngineConfig,
    registry: Arc<dyn TaskRegistry>,
    executor: Arc<dyn TaskExecutor>,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
    in_flight: InFlightTracker,
    running: AtomicBool,
    stopped: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl SchedulerEngine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<dyn TaskRegistry>,
        executor: Arc<dyn TaskExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            registry,
            executor,
            clock,
            state: Mutex::new(EngineState {
                schedule: LiveSchedule::new(),
                last_reconciled: None,
            }),
            in_flight: InFlightTracker::new(),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Paths with a run currently in flight
    pub fn in_flight(&self) -> &InFlightTracker {
        &self.in_flight
    }

    /// Number of tasks in the live schedule
    pub async fn scheduled_count(&self) -> usize {
        self.state.lock().await.schedule.len()
    }

    /// Pending run time of a scheduled task
    pub async fn next_run_at(&self, task_id: i64) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .schedule
            .get(task_id)
            .map(|entry| entry.next_run_at)
    }

    /// Reconcile against the registry regardless of the rate limit
    ///
    /// On a registry error the live schedule is left unchanged.
    #[instrument(skip(self))]
    pub async fn reconcile_now(&self) -> Result<ReconcileReport, SchedulerError> {
        let mut state = self.state.lock().await;
        self.reconcile_locked(&mut state).await
    }

    /// Run one tick: reconcile if the window has elapsed, then dispatch due tasks
    ///
    /// Returns the number of runs dispatched.
    pub async fn tick(&self) -> usize {
        if self.is_stopped() {
            return 0;
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let reconcile_due = state
            .last_reconciled
            .map_or(true, |last| now - last > self.config.reconcile_interval);
        if reconcile_due {
            debug!("Checking for task updates");
            if let Err(e) = self.reconcile_locked(&mut state).await {
                error!(error = %e, "Failed to reconcile tasks, retrying next tick");
            }
        }

        let now = self.clock.now();
        let due = state.schedule.take_due(now);

        for (task_id, e) in &due.dropped {
            warn!(task_id = task_id, error = %e, "Invalid interval, task removed from schedule");
        }
        telemetry::update_scheduled_tasks(state.schedule.len());
        drop(state);

        let mut dispatched = 0;
        for ctx in due.ready {
            if self.is_stopped() {
                break;
            }
            if self.dispatch(ctx) {
                dispatched += 1;
            }
        }

        if dispatched > 0 {
            debug!(dispatched = dispatched, "Dispatched due tasks");
        }
        dispatched
    }

    async fn reconcile_locked(
        &self,
        state: &mut EngineState,
    ) -> Result<ReconcileReport, SchedulerError> {
        let records = match self.registry.get_all().await {
            Ok(records) => records,
            Err(e) => {
                telemetry::record_reconciliation(false);
                return Err(e.into());
            }
        };

        let now = self.clock.now();
        let report = state.schedule.reconcile(&records, now);
        state.last_reconciled = Some(now);

        for id in &report.added {
            if let Some(entry) = state.schedule.get(*id) {
                info!(
                    task_id = id,
                    path = %entry.record.path,
                    every = %entry.record.every,
                    next_run_at = %entry.next_run_at,
                    "Scheduled task"
                );
            }
        }
        for id in &report.updated {
            debug!(task_id = id, "Updated task");
        }
        for id in &report.removed {
            info!(task_id = id, "Task no longer registered, removed from schedule");
        }
        for (id, e) in &report.invalid {
            warn!(task_id = id, error = %e, "Invalid interval, task not scheduled");
        }

        telemetry::record_reconciliation(true);
        telemetry::update_scheduled_tasks(state.schedule.len());
        Ok(report)
    }

    /// Spawn a run unless one is already in flight for the same path
    fn dispatch(&self, ctx: ExecutionContext) -> bool {
        let Some(guard) = self.in_flight.try_acquire(&ctx.path) else {
            info!(
                task_id = ctx.task_id,
                path = %ctx.path.display(),
                "Previous run still in flight, skipping"
            );
            telemetry::record_dispatch_skipped();
            return false;
        };

        debug!(task_id = ctx.task_id, path = %ctx.path.display(), "Dispatching task");
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let _guard = guard;
            executor.execute(ctx).await;
        });
        true
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        // Subscribe before the initial reconcile so an early stop is not missed
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            reconcile_interval_seconds = self.config.reconcile_interval.num_seconds(),
            "Starting scheduler engine"
        );

        if let Err(e) = self.reconcile_now().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.is_stopped() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(in_flight = self.in_flight.len(), "Scheduler engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), SchedulerError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Stopping scheduler engine");
        let _ = self.shutdown_tx.send(());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.reconcile_interval, chrono::Duration::seconds(10));
    }

    #[test]
    fn test_engine_config_from_settings() {
        let config = EngineConfig::from(&SchedulerConfig {
            tick_interval_ms: 250,
            reconcile_interval_seconds: 30,
        });
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.reconcile_interval, chrono::Duration::seconds(30));
    }
}
