//! Event payloads emitted to the ledger
//!
//! Every payload serializes to canonical JSON (keys sorted by the ledger)
//! and is witnessed by the writer. Identifiers serialize as plain UUID
//! strings; timestamps as RFC 3339.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use fates_types::{
    AcknowledgmentId, ArchonId, EscalationId, EscalationSource, FatesError, KingId, PetitionId,
    PetitionState, PetitionType, ReasonCode, ReferralId, Result, SessionId, SignerId, SubmitterId,
};

/// Serialize a payload struct into the JSON value handed to the writer.
fn to_payload<T: Serialize>(event: &T) -> Result<Value> {
    serde_json::to_value(event).map_err(|e| FatesError::internal(e.to_string()))
}

/// `petition.received`
#[derive(Debug, Clone, Serialize)]
pub struct PetitionReceivedEvent {
    pub petition_id: PetitionId,
    pub petition_type: PetitionType,
    pub realm: String,
    /// Base64-encoded blake3 digest of the petition text
    pub content_hash: String,
    pub submitter_id: Option<SubmitterId>,
    pub received_at: DateTime<Utc>,
}

impl PetitionReceivedEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.fated` - the generic fate event written by the coordinator
#[derive(Debug, Clone, Serialize)]
pub struct PetitionFatedEvent {
    pub petition_id: PetitionId,
    pub previous_state: PetitionState,
    pub new_state: PetitionState,
    /// Agent or system identifier that assigned the fate
    pub actor: String,
    pub reason: Option<String>,
}

impl PetitionFatedEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.fate.acknowledged`
#[derive(Debug, Clone, Serialize)]
pub struct PetitionAcknowledgedEvent {
    pub acknowledgment_id: AcknowledgmentId,
    pub petition_id: PetitionId,
    pub reason_code: ReasonCode,
    pub acknowledging_archon_ids: Vec<ArchonId>,
    pub acknowledged_at: DateTime<Utc>,
    pub witness_hash: String,
    pub rationale: Option<String>,
    pub reference_petition_id: Option<PetitionId>,
}

impl PetitionAcknowledgedEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.escalation.acknowledged_by_king`
#[derive(Debug, Clone, Serialize)]
pub struct KingAcknowledgedEscalationEvent {
    pub acknowledgment_id: AcknowledgmentId,
    pub petition_id: PetitionId,
    pub king_id: KingId,
    pub reason_code: ReasonCode,
    pub rationale: String,
    pub acknowledged_at: DateTime<Utc>,
    pub realm_id: String,
    pub witness_hash: String,
}

impl KingAcknowledgedEscalationEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.referral.created`
#[derive(Debug, Clone, Serialize)]
pub struct ReferralCreatedEvent {
    pub referral_id: ReferralId,
    pub petition_id: PetitionId,
    pub realm_id: String,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub witness_hash: String,
}

impl ReferralCreatedEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.escalation.triggered`
#[derive(Debug, Clone, Serialize)]
pub struct EscalationTriggeredEvent {
    pub escalation_id: EscalationId,
    pub petition_id: PetitionId,
    pub trigger_type: String,
    pub co_signer_count: u32,
    pub threshold: u32,
    pub triggered_at: DateTime<Utc>,
    pub triggered_by: Option<SignerId>,
    pub petition_type: PetitionType,
    pub escalation_source: EscalationSource,
    pub realm_id: String,
}

impl EscalationTriggeredEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// Why a deliberation session was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Petition auto-escalated out from under the session
    AutoEscalated,
    /// Deliberation timeout expired
    Timeout,
    /// Cancelled by an operator
    Manual,
    /// The petition was withdrawn
    PetitionWithdrawn,
}

/// `deliberation.session.cancelled`
#[derive(Debug, Clone, Serialize)]
pub struct DeliberationCancelledEvent {
    pub session_id: SessionId,
    pub petition_id: PetitionId,
    pub cancel_reason: CancelReason,
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: Option<SignerId>,
    pub transcript_preserved: bool,
    pub participating_archons: Vec<ArchonId>,
    pub escalation_id: Option<EscalationId>,
}

impl DeliberationCancelledEvent {
    /// Build a cancellation event, enforcing that AUTO_ESCALATED carries
    /// the escalation it was cancelled for.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        petition_id: PetitionId,
        cancel_reason: CancelReason,
        cancelled_at: DateTime<Utc>,
        cancelled_by: Option<SignerId>,
        participating_archons: Vec<ArchonId>,
        escalation_id: Option<EscalationId>,
    ) -> Result<Self> {
        if cancel_reason == CancelReason::AutoEscalated && escalation_id.is_none() {
            return Err(FatesError::validation(
                "escalation_id",
                "escalation_id is required when cancel_reason is AUTO_ESCALATED",
            ));
        }
        Ok(Self {
            session_id,
            petition_id,
            cancel_reason,
            cancelled_at,
            cancelled_by,
            transcript_preserved: true,
            participating_archons,
            escalation_id,
        })
    }

    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.withdrawn`
#[derive(Debug, Clone, Serialize)]
pub struct PetitionWithdrawnEvent {
    pub petition_id: PetitionId,
    pub withdrawn_by: SubmitterId,
    pub reason: Option<String>,
    pub withdrawn_at: DateTime<Utc>,
}

impl PetitionWithdrawnEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.monitoring.orphans_detected`
#[derive(Debug, Clone, Serialize)]
pub struct OrphansDetectedEvent {
    pub detected_at: DateTime<Utc>,
    pub orphan_count: usize,
    pub orphan_petition_ids: Vec<PetitionId>,
    pub oldest_orphan_age_hours: f64,
    pub detection_threshold_hours: u32,
}

impl OrphansDetectedEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}

/// `petition.monitoring.reprocessing_triggered`
#[derive(Debug, Clone, Serialize)]
pub struct ReprocessingTriggeredEvent {
    pub petition_ids: Vec<PetitionId>,
    pub triggered_by: String,
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
}

impl ReprocessingTriggeredEvent {
    pub fn payload(&self) -> Result<Value> {
        to_payload(self)
    }
}
