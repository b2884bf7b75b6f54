//! Three Fates Scheduler - Durable timers
//!
//! A scheduled job is persisted before `schedule` returns, so a deadline
//! survives process restart and fires at-least-once at or after `run_at`.
//! The runner drains due jobs in arrival order and dispatches to handlers
//! keyed by `job_type`.
//!
//! Handlers must be idempotent: re-delivery of the same job id, or
//! re-entry on the same business state, produces the same outcome without
//! duplicate effects. Handlers run as writes; when the system is halted
//! they fail with the halt error and the job is requeued with backoff.

pub mod job;
pub mod runner;
pub mod store;

pub use job::*;
pub use runner::*;
pub use store::*;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use fates_types::{JobId, Result};

/// Durable timer contract
#[async_trait::async_trait]
pub trait JobScheduler: Send + Sync {
    /// Persist a job durably and return its id. The deadline will fire
    /// at-least-once at or after `run_at`.
    async fn schedule(&self, job_type: &str, payload: Value, run_at: DateTime<Utc>)
        -> Result<JobId>;

    /// Best-effort cancellation; idempotent.
    async fn cancel(&self, job_id: JobId) -> Result<()>;
}

/// Scheduler backed by a [`JobStore`]
#[derive(Clone)]
pub struct StoreScheduler {
    store: Arc<dyn JobStore>,
}

impl StoreScheduler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl JobScheduler for StoreScheduler {
    async fn schedule(
        &self,
        job_type: &str,
        payload: Value,
        run_at: DateTime<Utc>,
    ) -> Result<JobId> {
        let job = ScheduledJob::new(job_type, payload, run_at);
        let job_id = job.id;
        self.store.insert(&job).await?;
        tracing::info!(job_id = %job_id, job_type, run_at = %run_at, "job scheduled");
        Ok(job_id)
    }

    async fn cancel(&self, job_id: JobId) -> Result<()> {
        self.store.cancel(job_id).await?;
        tracing::info!(job_id = %job_id, "job cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_schedule_persists_before_returning() {
        let store = Arc::new(InMemoryJobStore::new());
        let scheduler = StoreScheduler::new(store.clone());

        let run_at = Utc::now() + chrono::Duration::hours(72);
        let job_id = scheduler
            .schedule("referral_timeout", json!({"referral_id": "r1"}), run_at)
            .await
            .unwrap();

        let job = store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_type, "referral_timeout");
        assert_eq!(job.run_at, run_at);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let store = Arc::new(InMemoryJobStore::new());
        let scheduler = StoreScheduler::new(store.clone());

        let job_id = scheduler
            .schedule("referral_timeout", json!({}), Utc::now())
            .await
            .unwrap();
        scheduler.cancel(job_id).await.unwrap();
        scheduler.cancel(job_id).await.unwrap();
        // Cancelling an unknown job is also a no-op.
        scheduler.cancel(JobId::new()).await.unwrap();

        assert_eq!(
            store.get(job_id).await.unwrap().unwrap().status,
            JobStatus::Cancelled
        );
    }
}
