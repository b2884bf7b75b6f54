//! Referral record for petitions routed to a Knight
//!
//! A referral carries a durable deadline. If no resolution arrives before
//! the deadline, the timeout handler marks the referral EXPIRED and the
//! petition is auto-acknowledged with the EXPIRED reason code.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FatesError, Result};
use crate::identity::{PetitionId, ReferralId};

/// Default referral deadline, expressed in cycles
pub const DEFAULT_DEADLINE_CYCLES: u32 = 3;

/// Length of one deliberation cycle
pub const CYCLE_LENGTH_HOURS: i64 = 24;

/// Lifecycle status of a referral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralStatus {
    /// Awaiting Knight response
    Pending,
    /// Knight responded before the deadline
    Resolved,
    /// Deadline passed without a response
    Expired,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Resolved => "RESOLVED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RESOLVED" => Ok(Self::Resolved),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(FatesError::validation(
                "status",
                format!("unknown referral status: {other}"),
            )),
        }
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A referral of a petition to a Knight realm (1:1 with a REFERRED petition)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: ReferralId,
    pub petition_id: PetitionId,
    /// Knight realm the petition was routed to
    pub realm_id: String,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: ReferralStatus,
    /// Digest over the canonical referral content (`blake3:<hex>`)
    pub witness_hash: String,
}

impl Referral {
    /// Compute the deadline for a referral created at `from`, `cycles`
    /// cycles out.
    pub fn deadline_after(from: DateTime<Utc>, cycles: u32) -> DateTime<Utc> {
        from + Duration::hours(CYCLE_LENGTH_HOURS * i64::from(cycles))
    }

    /// Whether the deadline has passed relative to `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_deadline_is_three_cycles_out() {
        let now = Utc::now();
        let deadline = Referral::deadline_after(now, DEFAULT_DEADLINE_CYCLES);
        assert_eq!(deadline - now, Duration::hours(72));
    }

    #[test]
    fn test_overdue_at_exact_deadline() {
        let now = Utc::now();
        let referral = Referral {
            id: ReferralId::new(),
            petition_id: PetitionId::new(),
            realm_id: "governance".to_string(),
            deadline: now,
            created_at: now - Duration::hours(72),
            status: ReferralStatus::Pending,
            witness_hash: "blake3:00".to_string(),
        };
        assert!(referral.is_overdue(now));
        assert!(!referral.is_overdue(now - Duration::seconds(1)));
    }
}
