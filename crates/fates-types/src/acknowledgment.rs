//! Acknowledgment reason codes and the Acknowledgment record
//!
//! An Acknowledgment is the formal closure of a petition with the
//! ACKNOWLEDGED fate. At most one exists per petition. It is produced
//! either by the Marquis collective (at least 2 of 3 archon seats), by a
//! King acting alone on an escalated petition, or by the system itself
//! (referral expiry, Knight recommendation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FatesError, Result};
use crate::identity::{AcknowledgmentId, ArchonId, KingId, PetitionId};

/// Minimum archon seats required for a Marquis acknowledgment (2-of-3 supermajority)
pub const MIN_ACKNOWLEDGING_ARCHONS: usize = 2;

/// Minimum rationale length for a King acknowledgment
pub const MIN_KING_RATIONALE_LENGTH: usize = 100;

/// Reason for acknowledging a petition.
///
/// REFUSED and NO_ACTION_WARRANTED require a rationale; DUPLICATE requires
/// a reference to the canonical petition; EXPIRED and KNIGHT_REFERRAL are
/// system codes that bypass the archon quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Concern has been or will be addressed
    Addressed,
    /// Input recorded for future consideration
    Noted,
    /// Duplicates an existing or resolved petition
    Duplicate,
    /// Matter falls outside governance jurisdiction
    OutOfScope,
    /// Petition violates policy or norms
    Refused,
    /// After review, no action is appropriate
    NoActionWarranted,
    /// Petitioner withdrew the petition
    Withdrawn,
    /// Referral deadline passed with no Knight response
    Expired,
    /// Knight recommended acknowledgment
    KnightReferral,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Addressed => "ADDRESSED",
            Self::Noted => "NOTED",
            Self::Duplicate => "DUPLICATE",
            Self::OutOfScope => "OUT_OF_SCOPE",
            Self::Refused => "REFUSED",
            Self::NoActionWarranted => "NO_ACTION_WARRANTED",
            Self::Withdrawn => "WITHDRAWN",
            Self::Expired => "EXPIRED",
            Self::KnightReferral => "KNIGHT_REFERRAL",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "ADDRESSED" => Ok(Self::Addressed),
            "NOTED" => Ok(Self::Noted),
            "DUPLICATE" => Ok(Self::Duplicate),
            "OUT_OF_SCOPE" => Ok(Self::OutOfScope),
            "REFUSED" => Ok(Self::Refused),
            "NO_ACTION_WARRANTED" => Ok(Self::NoActionWarranted),
            "WITHDRAWN" => Ok(Self::Withdrawn),
            "EXPIRED" => Ok(Self::Expired),
            "KNIGHT_REFERRAL" => Ok(Self::KnightReferral),
            other => Err(FatesError::validation(
                "reason_code",
                format!("unknown reason code: {other}"),
            )),
        }
    }

    /// Whether this code requires non-empty rationale text
    pub fn requires_rationale(&self) -> bool {
        matches!(self, Self::Refused | Self::NoActionWarranted)
    }

    /// Whether this code requires a reference petition
    pub fn requires_reference(&self) -> bool {
        matches!(self, Self::Duplicate)
    }

    /// Whether this is a system-triggered code that bypasses the archon
    /// quorum and the dwell-time check
    pub fn is_system(&self) -> bool {
        matches!(self, Self::Expired | Self::KnightReferral)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that all requirements for the given reason code are met.
pub fn validate_reason_requirements(
    reason_code: ReasonCode,
    rationale: Option<&str>,
    reference_petition_id: Option<PetitionId>,
) -> Result<()> {
    if reason_code.requires_rationale() {
        let present = rationale.map(|r| !r.trim().is_empty()).unwrap_or(false);
        if !present {
            return Err(FatesError::validation(
                "rationale",
                format!("rationale is required for reason code {reason_code}"),
            ));
        }
    }

    if reason_code.requires_reference() && reference_petition_id.is_none() {
        return Err(FatesError::validation(
            "reference_petition_id",
            "reference petition is required for DUPLICATE acknowledgments",
        ));
    }

    Ok(())
}

/// Acknowledgment record for a petition.
///
/// Exactly one of `acknowledging_archon_ids` (non-empty) or
/// `acknowledged_by_king_id` is populated, unless the reason is a system
/// code, in which case both are empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub id: AcknowledgmentId,
    pub petition_id: PetitionId,
    pub reason_code: ReasonCode,
    pub rationale: Option<String>,
    pub reference_petition_id: Option<PetitionId>,
    pub acknowledging_archon_ids: Vec<ArchonId>,
    pub acknowledged_by_king_id: Option<KingId>,
    pub acknowledged_at: DateTime<Utc>,
    /// Digest over the canonical acknowledgment content (`blake3:<hex>`)
    pub witness_hash: String,
}

impl Acknowledgment {
    /// Create an acknowledgment, enforcing all record invariants.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: AcknowledgmentId,
        petition_id: PetitionId,
        reason_code: ReasonCode,
        rationale: Option<String>,
        reference_petition_id: Option<PetitionId>,
        acknowledging_archon_ids: Vec<ArchonId>,
        acknowledged_by_king_id: Option<KingId>,
        acknowledged_at: DateTime<Utc>,
        witness_hash: String,
    ) -> Result<Self> {
        validate_reason_requirements(reason_code, rationale.as_deref(), reference_petition_id)?;

        let is_king = acknowledged_by_king_id.is_some();
        if is_king && !acknowledging_archon_ids.is_empty() {
            return Err(FatesError::validation(
                "acknowledging_archon_ids",
                "King acknowledgments carry no archon seats",
            ));
        }
        if !is_king
            && !reason_code.is_system()
            && acknowledging_archon_ids.len() < MIN_ACKNOWLEDGING_ARCHONS
        {
            return Err(FatesError::validation(
                "acknowledging_archon_ids",
                format!(
                    "at least {MIN_ACKNOWLEDGING_ARCHONS} archons must acknowledge, got {}",
                    acknowledging_archon_ids.len()
                ),
            ));
        }
        if witness_hash.trim().is_empty() {
            return Err(FatesError::validation(
                "witness_hash",
                "witness hash is required",
            ));
        }

        Ok(Self {
            id,
            petition_id,
            reason_code,
            rationale,
            reference_petition_id,
            acknowledging_archon_ids,
            acknowledged_by_king_id,
            acknowledged_at,
            witness_hash,
        })
    }
}
