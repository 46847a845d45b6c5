//! The top-level scheduler loop.
//!
//! Wakes on a fixed tick, reads the due set from the schedule store and
//! submits one evaluation task per due rule to the worker pool without
//! waiting for completion. Rescheduling happens inside the task itself, so
//! the loop never blocks on a slow rule and a rule is rescheduled at
//! `now + check_interval` whatever its evaluation outcome was.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use palert_store::RuleStore;

use crate::pool::{Task, WorkerPool, DEFAULT_WORKERS};
use crate::processor::RuleProcessor;

/// Fixed loop wake-up interval, decoupled from the per-rule check interval.
pub const TICK_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already running")]
    AlreadyRunning,
}

/// Periodic rule dispatch: schedule store in, worker pool out.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    running: Mutex<bool>,
    stop_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

struct SchedulerInner {
    check_interval: Duration,
    store: Arc<dyn RuleStore>,
    processor: Arc<RuleProcessor>,
    pool: WorkerPool,
}

impl Scheduler {
    pub fn new(
        check_interval: Duration,
        store: Arc<dyn RuleStore>,
        processor: Arc<RuleProcessor>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                check_interval,
                store,
                processor,
                pool: WorkerPool::new(DEFAULT_WORKERS),
            }),
            running: Mutex::new(false),
            stop_tx,
            loop_handle: Mutex::new(None),
        }
    }

    /// Start the loop and its worker pool. Not reentrant: starting an
    /// already running scheduler is a programming error surfaced to the
    /// caller.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().expect("scheduler lock poisoned");
        if *running {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.inner.pool.start();

        let inner = self.inner.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; consume
            // it so dispatch starts one full tick after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => inner.dispatch_due().await,
                }
            }
        });

        *self.loop_handle.lock().expect("scheduler lock poisoned") = Some(handle);
        *running = true;

        info!(check_interval = ?self.inner.check_interval, "scheduler started");
        Ok(())
    }

    /// Signal termination and wait for the loop and all in-flight worker
    /// tasks to finish. Stopping an idle scheduler is a no-op.
    pub async fn stop(&self) {
        {
            let mut running = self.running.lock().expect("scheduler lock poisoned");
            if !*running {
                return;
            }
            *running = false;
        }

        let _ = self.stop_tx.send(true);
        let handle = self
            .loop_handle
            .lock()
            .expect("scheduler lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.inner.pool.stop().await;
        info!("scheduler stopped");
    }
}

impl SchedulerInner {
    /// One tick: read the due set and submit one evaluation task per rule.
    async fn dispatch_due(&self) {
        let now = Utc::now();
        let due = match self.store.scheduled_rules(now).await {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "failed to get scheduled rules");
                return;
            }
        };

        for rule_id in due {
            let store = self.store.clone();
            let processor = self.processor.clone();
            let check_interval = self.check_interval;

            let task: Task = Box::pin(async move {
                if let Err(err) = processor.process_rule(rule_id).await {
                    error!(rule_id = %rule_id, error = %err, "failed to process rule");
                }

                let offset = chrono::Duration::from_std(check_interval)
                    .unwrap_or_else(|_| chrono::Duration::seconds(300));
                let next = Utc::now() + offset;
                match store.schedule_rule(rule_id, next).await {
                    Ok(()) => {
                        debug!(rule_id = %rule_id, next = %next.to_rfc3339(),
                               "rule scheduled for next check");
                    }
                    Err(err) => {
                        error!(rule_id = %rule_id, error = %err, "failed to reschedule rule");
                    }
                }
            });

            self.pool.submit(task);
        }
    }
}
