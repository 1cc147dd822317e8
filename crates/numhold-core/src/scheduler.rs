//! Expiration scheduler.
//!
//! Two independent periodic loops share one [`TransitionEngine`]:
//!
//! - **hold sweep**: resolves due holds as `success` through the same guarded
//!   `mark_success` operators use. A hold resolved by someone else between the
//!   due-query and the write is a lost race, not a failure.
//! - **stale purge**: deletes `waiting` records older than the retention
//!   window with one predicate delete.
//!
//! A failing tick is logged and the loop waits for its next tick. One bad
//! record never stops the rest of a sweep.

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use serde::Serialize;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    engine::TransitionEngine, record::Resolution, status::RecordStatus, store::DeletePredicate,
    Error, Result,
};

const RESOLUTION_CHANNEL_CAPACITY: usize = 256;

/// Longest accepted retention window, in days (ten years).
pub const MAX_RETENTION_DAYS: i64 = 365 * 10;

/// Intervals and retention for the two loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub sweep_interval: StdDuration,
    pub purge_interval: StdDuration,
    /// Waiting records created longer ago than this are purged.
    pub retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: StdDuration::from_secs(60),
            purge_interval: StdDuration::from_secs(3600),
            retention: Duration::hours(24),
        }
    }
}

impl SchedulerConfig {
    /// Reject values the loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "sweep interval must be greater than zero".into(),
            ));
        }
        if self.purge_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "purge interval must be greater than zero".into(),
            ));
        }
        if self.retention <= Duration::zero() {
            return Err(Error::InvalidConfig(
                "retention window must be greater than zero".into(),
            ));
        }
        if self.retention > Duration::days(MAX_RETENTION_DAYS) {
            return Err(Error::InvalidConfig(format!(
                "retention window cannot exceed {MAX_RETENTION_DAYS} days"
            )));
        }
        Ok(())
    }
}

/// Outcome of one hold sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Holds the due-query returned.
    pub due: usize,
    /// Holds this sweep moved to `success`.
    pub resolved: usize,
    /// Holds resolved or removed by someone else first.
    pub lost_races: usize,
    /// Holds whose resolution failed with a storage or data error.
    pub failed: usize,
}

/// Outcome of one stale purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub removed: u64,
}

/// Periodic hold expiry and stale-record purge.
#[derive(Debug)]
pub struct ExpirationScheduler {
    engine: Arc<TransitionEngine>,
    config: SchedulerConfig,
    resolutions: broadcast::Sender<Resolution>,
}

impl ExpirationScheduler {
    pub fn new(engine: Arc<TransitionEngine>, config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let (resolutions, _) = broadcast::channel(RESOLUTION_CHANNEL_CAPACITY);
        Ok(Self {
            engine,
            config,
            resolutions,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Receive every resolution the sweep makes from now on.
    ///
    /// Slow receivers may observe `RecvError::Lagged`.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Resolution> {
        self.resolutions.subscribe()
    }

    /// Resolve every hold that is due now.
    ///
    /// Only the due-query itself can fail the sweep; per-record errors are
    /// counted in the report.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let now = self.engine.clock().now();
        let default = self.engine.hold_config().get();
        let due = self
            .engine
            .bounded("due_holds", self.engine.store().due_holds(now, default))
            .await?;

        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };
        for record in due {
            match self.engine.mark_success(&record.number).await {
                Ok(resolution) => {
                    report.resolved += 1;
                    let _ = self.resolutions.send(resolution);
                }
                Err(err) if err.is_lost_race() || matches!(err, Error::NotFound(_)) => {
                    report.lost_races += 1;
                    debug!(number = %record.number, reason = %err, "Hold already resolved");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(number = %record.number, error = %err, "Failed to expire hold");
                }
            }
        }
        Ok(report)
    }

    /// Delete waiting records older than the retention window.
    pub async fn purge_once(&self) -> Result<PurgeReport> {
        let now = self.engine.clock().now();
        let cutoff = now.checked_sub_signed(self.config.retention).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "retention window reaches before the supported calendar at {now}"
            ))
        })?;
        let removed = self
            .engine
            .bounded(
                "purge",
                self.engine.store().delete_where(DeletePredicate::CreatedBefore {
                    status: RecordStatus::Waiting,
                    cutoff,
                }),
            )
            .await?;
        Ok(PurgeReport { removed })
    }

    async fn sweep_tick(&self) {
        match self.sweep_once().await {
            Ok(report) if report.due > 0 => info!(
                due = report.due,
                resolved = report.resolved,
                lost_races = report.lost_races,
                failed = report.failed,
                "Hold sweep finished"
            ),
            Ok(_) => debug!("No holds due"),
            Err(err) => error!(error = %err, "Hold sweep failed"),
        }
    }

    async fn purge_tick(&self) {
        match self.purge_once().await {
            Ok(report) if report.removed > 0 => {
                info!(removed = report.removed, "Purged stale waiting numbers");
            }
            Ok(_) => debug!("No stale numbers"),
            Err(err) => error!(error = %err, "Stale purge failed"),
        }
    }

    /// Start both loops on the current tokio runtime.
    ///
    /// Each loop ticks immediately, then every interval. Dropping the
    /// returned handle stops both loops at their next await point.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, _) = broadcast::channel(1);

        let sweeper = {
            let scheduler = Arc::clone(&self);
            let mut shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval(scheduler.config.sweep_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = ticker.tick() => {
                            scheduler.sweep_tick().instrument(info_span!("hold_sweep")).await;
                        }
                    }
                }
                debug!("Hold sweep stopped");
            })
        };

        let purger = {
            let scheduler = Arc::clone(&self);
            let mut shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval(scheduler.config.purge_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = ticker.tick() => {
                            scheduler.purge_tick().instrument(info_span!("stale_purge")).await;
                        }
                    }
                }
                debug!("Stale purge stopped");
            })
        };

        info!(
            sweep_secs = self.config.sweep_interval.as_secs(),
            purge_secs = self.config.purge_interval.as_secs(),
            retention_hours = self.config.retention.num_hours(),
            "Expiration scheduler started"
        );

        SchedulerHandle {
            shutdown_tx,
            tasks: vec![sweeper, purger],
        }
    }
}

/// Running scheduler loops.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// True once both loops have exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Signal both loops and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Scheduler loop ended abnormally");
            }
        }
        info!("Expiration scheduler stopped");
    }
}
