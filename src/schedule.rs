//! Generic periodic background task.
//!
//! One instance owns one background worker. The inter-tick sleep happens
//! after the task body, so executions never overlap, and a failing task
//! never stops the schedule.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Error type produced by periodic task bodies.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by [`Task::run`].
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'a>>;

/// A unit of work runnable on a fixed interval.
pub trait Task: Send + Sync + 'static {
    /// Runs one tick of the task.
    fn run(&self) -> TaskFuture<'_>;
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs a [`Task`] repeatedly on a fixed wall-clock interval.
pub struct PeriodicTask {
    interval: Duration,
    task: Arc<dyn Task>,
    last_run: Arc<Mutex<Option<DateTime<Utc>>>>,
    worker: Option<Worker>,
}

impl PeriodicTask {
    /// Creates a scheduler for `task`; nothing runs until
    /// [`PeriodicTask::start`].
    #[must_use]
    pub fn new(interval: Duration, task: Arc<dyn Task>) -> Self {
        Self {
            interval,
            task,
            last_run: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    /// Starts the background worker. A no-op when already running.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = Arc::clone(&self.task);
        let last_run = Arc::clone(&self.last_run);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            loop {
                match task.run().await {
                    Ok(()) => {
                        *lock(&last_run) = Some(Utc::now());
                    }
                    Err(err) => {
                        // The schedule outlives individual failures; the
                        // next tick still happens after the full interval.
                        tracing::error!(%err, "periodic task failed");
                    }
                }

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        self.worker = Some(Worker { shutdown, handle });
        tracing::debug!(interval = ?self.interval, "periodic task started");
    }

    /// Signals the worker to exit and waits until it has fully
    /// terminated. A no-op when not running; an in-flight task body runs
    /// to completion first.
    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.shutdown.send(true).ok();
        if let Err(err) = worker.handle.await {
            tracing::error!(%err, "periodic task worker did not shut down cleanly");
        }
        tracing::debug!("periodic task stopped");
    }

    /// Returns whether the background worker is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Returns the time of the last successful run, `None` when no run
    /// has succeeded yet.
    #[must_use]
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_run)
    }
}

fn lock(last_run: &Mutex<Option<DateTime<Utc>>>) -> MutexGuard<'_, Option<DateTime<Utc>>> {
    match last_run.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
