//! Scheduled job model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use fates_types::{FatesError, JobId, Result};

/// Lifecycle status of a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for its deadline
    Pending,
    /// Handler completed successfully
    Completed,
    /// Cancelled before firing
    Cancelled,
    /// Retry budget exhausted
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            other => Err(FatesError::validation(
                "status",
                format!("unknown job status: {other}"),
            )),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable timer with an opaque JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub job_type: String,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Delivery attempts so far; incremented on requeue
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(job_type: &str, payload: Value, run_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.to_string(),
            payload,
            run_at,
            status: JobStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether the job is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.run_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_due_at_or_after_deadline() {
        let run_at = Utc::now();
        let job = ScheduledJob::new("referral_timeout", json!({}), run_at);
        assert!(job.is_due(run_at));
        assert!(job.is_due(run_at + chrono::Duration::seconds(5)));
        assert!(!job.is_due(run_at - chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_non_pending_is_never_due() {
        let mut job = ScheduledJob::new("referral_timeout", json!({}), Utc::now());
        job.status = JobStatus::Completed;
        assert!(!job.is_due(Utc::now() + chrono::Duration::days(1)));
    }
}
