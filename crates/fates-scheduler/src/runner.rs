//! Job runner: drains due jobs and dispatches to handlers
//!
//! A halted system surfaces as a `SystemHalted` error from the handler;
//! the runner requeues the job with exponential backoff and retries once
//! the halt lifts. Transient failures follow the same path until the
//! attempt budget runs out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use fates_types::{FatesError, Result};

use crate::job::ScheduledJob;
use crate::store::JobStore;

/// Default polling cadence for the drain loop
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default retry budget per job
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Handler for one `job_type`
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    /// Process a due job. Must be idempotent under re-delivery.
    async fn handle(&self, job: &ScheduledJob) -> Result<()>;
}

/// Drains due jobs and dispatches them to registered handlers
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Register the handler for a job type. Last registration wins.
    pub fn register(&mut self, job_type: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.to_string(), handler);
    }

    /// Drain every job due at `now` once. Returns the number of jobs that
    /// completed successfully.
    ///
    /// Exposed separately from [`run`](Self::run) so deadline behavior can
    /// be driven with an explicit clock.
    pub async fn run_due_once(&self, now: DateTime<Utc>) -> Result<u32> {
        let due = self.store.due(now, 100).await?;
        let mut completed = 0;

        for job in due {
            let Some(handler) = self.handlers.get(&job.job_type) else {
                tracing::error!(job_id = %job.id, job_type = %job.job_type, "no handler registered");
                self.store.mark_failed(job.id).await?;
                continue;
            };

            match handler.handle(&job).await {
                Ok(()) => {
                    self.store.mark_completed(job.id).await?;
                    completed += 1;
                    tracing::info!(job_id = %job.id, job_type = %job.job_type, "job completed");
                }
                Err(FatesError::SystemHalted { reason }) => {
                    let delay = backoff_delay(job.attempts);
                    tracing::warn!(
                        job_id = %job.id,
                        halt_reason = %reason,
                        retry_in_secs = delay.num_seconds(),
                        "system halted, requeueing job",
                    );
                    self.store.requeue(job.id, now + delay).await?;
                }
                Err(err) if job.attempts + 1 < self.max_attempts => {
                    let delay = backoff_delay(job.attempts);
                    tracing::warn!(
                        job_id = %job.id,
                        error = %err,
                        attempt = job.attempts + 1,
                        retry_in_secs = delay.num_seconds(),
                        "job failed, requeueing",
                    );
                    self.store.requeue(job.id, now + delay).await?;
                }
                Err(err) => {
                    tracing::error!(
                        job_id = %job.id,
                        error = %err,
                        attempts = job.attempts + 1,
                        "job failed, retry budget exhausted",
                    );
                    self.store.mark_failed(job.id).await?;
                }
            }
        }

        Ok(completed)
    }

    /// Poll-and-drain loop. Runs until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_due_once(Utc::now()).await {
                tracing::error!(error = %err, "job drain pass failed");
            }
        }
    }
}

/// Exponential backoff: 2^attempts seconds, capped at five minutes.
fn backoff_delay(attempts: u32) -> chrono::Duration {
    let secs = 1u64 << attempts.min(8);
    chrono::Duration::seconds(secs.min(300) as i64)
}
