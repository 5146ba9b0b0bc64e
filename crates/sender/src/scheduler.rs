//! Periodic batch-queue drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::{SenderConfig, SyncMode};
use crate::dispatch::Dispatcher;

/// Delay before the first drain after start-up.
pub const FIRST_TICK_DELAY: Duration = Duration::from_secs(60);

/// Handle to a running drain task. Dropping it stops the task.
#[derive(Debug)]
pub struct SchedulerHandle {
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Whether a drain task should exist for `config`.
    pub fn should_run(config: &SenderConfig) -> bool {
        config.auto_dispatch() && config.sync_mode == SyncMode::Batch
    }

    /// Start draining the dispatcher's queue on its configured interval.
    ///
    /// Returns `None` when batch mode is not active.
    pub fn spawn(dispatcher: Arc<Dispatcher>) -> Option<SchedulerHandle> {
        if !Self::should_run(dispatcher.config()) {
            tracing::info!("batch mode inactive, scheduler not started");
            return None;
        }
        let period = dispatcher.config().schedule_interval.period();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + FIRST_TICK_DELAY, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(period_secs = period.as_secs(), "scheduler_started");

            loop {
                ticker.tick().await;
                let report = dispatcher.process_batch_queue().await;
                tracing::debug!(
                    delivered = report.delivered,
                    retained = report.retained,
                    "scheduler_tick"
                );
            }
        });
        Some(SchedulerHandle { task })
    }
}
