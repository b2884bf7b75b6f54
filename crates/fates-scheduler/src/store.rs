//! Job persistence contract and in-memory adapter
//!
//! The store is owned exclusively by the scheduler. Durability is the
//! adapter's concern; the in-memory adapter exists for tests and
//! single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use fates_types::{FatesError, JobId, Result};

use crate::job::{JobStatus, ScheduledJob};

/// Persistence contract for scheduled jobs
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job.
    async fn insert(&self, job: &ScheduledJob) -> Result<()>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Option<ScheduledJob>>;

    /// Pending jobs with `run_at <= now`, in arrival order.
    async fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ScheduledJob>>;

    /// Mark a job completed.
    async fn mark_completed(&self, id: JobId) -> Result<()>;

    /// Mark a job failed (retry budget exhausted).
    async fn mark_failed(&self, id: JobId) -> Result<()>;

    /// Cancel a pending job; unknown or non-pending jobs are a no-op.
    async fn cancel(&self, id: JobId) -> Result<()>;

    /// Push a job's deadline out and count the attempt.
    async fn requeue(&self, id: JobId, run_at: DateTime<Utc>) -> Result<()>;
}

/// In-memory job store
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, ScheduledJob>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set_status(&self, id: JobId, status: JobStatus) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| FatesError::internal(format!("job {id} not found")))?;
        job.status = status;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &ScheduledJob) -> Result<()> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<ScheduledJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<ScheduledJob>> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<ScheduledJob> = jobs.values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_completed(&self, id: JobId) -> Result<()> {
        self.set_status(id, JobStatus::Completed).await
    }

    async fn mark_failed(&self, id: JobId) -> Result<()> {
        self.set_status(id, JobStatus::Failed).await
    }

    async fn cancel(&self, id: JobId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Cancelled;
            }
        }
        Ok(())
    }

    async fn requeue(&self, id: JobId, run_at: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| FatesError::internal(format!("job {id} not found")))?;
        job.run_at = run_at;
        job.attempts += 1;
        job.status = JobStatus::Pending;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_due_in_arrival_order() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();

        let mut first = ScheduledJob::new("a", json!({}), now - chrono::Duration::seconds(10));
        first.created_at = now - chrono::Duration::seconds(30);
        let mut second = ScheduledJob::new("b", json!({}), now - chrono::Duration::seconds(20));
        second.created_at = now - chrono::Duration::seconds(20);

        // Insert out of order; drain order follows arrival, not deadline.
        store.insert(&second).await.unwrap();
        store.insert(&first).await.unwrap();

        let due = store.due(now, 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, first.id);
        assert_eq!(due[1].id, second.id);
    }

    #[tokio::test]
    async fn test_future_jobs_not_due() {
        let store = InMemoryJobStore::new();
        let job = ScheduledJob::new("a", json!({}), Utc::now() + chrono::Duration::hours(1));
        store.insert(&job).await.unwrap();
        assert!(store.due(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requeue_counts_attempts() {
        let store = InMemoryJobStore::new();
        let job = ScheduledJob::new("a", json!({}), Utc::now());
        store.insert(&job).await.unwrap();

        store
            .requeue(job.id, Utc::now() + chrono::Duration::seconds(4))
            .await
            .unwrap();
        let requeued = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(requeued.attempts, 1);
        assert_eq!(requeued.status, JobStatus::Pending);
    }
}
