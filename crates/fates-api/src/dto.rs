//! Request and response DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fates_engine::{DecisionPackage, EscalationQueuePage, SubmissionResult};
use fates_types::{
    Acknowledgment, EscalationSource, KingId, Petition, PetitionId, PetitionState, PetitionType,
    SignerId, StatusToken, SubmitterId,
};

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitPetitionBody {
    #[serde(rename = "type")]
    pub petition_type: PetitionType,
    pub text: String,
    pub realm: Option<String>,
    pub submitter_id: Option<SubmitterId>,
    pub notification_channel: Option<String>,
    pub notification_webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CosignBody {
    pub signer_id: SignerId,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawBody {
    pub requester_id: SubmitterId,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub realm: String,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionPackageQuery {
    pub realm: String,
}

#[derive(Debug, Deserialize)]
pub struct KingAcknowledgeBody {
    pub king_id: KingId,
    pub reason_code: String,
    pub rationale: String,
    pub realm: String,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SubmitPetitionResponse {
    pub petition_id: PetitionId,
    pub state: PetitionState,
    #[serde(rename = "type")]
    pub petition_type: PetitionType,
    pub content_hash: String,
    pub realm: String,
    pub created_at: DateTime<Utc>,
}

impl From<SubmissionResult> for SubmitPetitionResponse {
    fn from(result: SubmissionResult) -> Self {
        Self {
            petition_id: result.petition_id,
            state: result.state,
            petition_type: result.petition_type,
            content_hash: result.content_hash,
            realm: result.realm,
            created_at: result.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CosignResponse {
    pub petition_id: PetitionId,
    pub co_signer_count: u32,
    pub escalated: bool,
}

#[derive(Debug, Serialize)]
pub struct PetitionStatusResponse {
    pub petition_id: PetitionId,
    #[serde(rename = "type")]
    pub petition_type: PetitionType,
    pub state: PetitionState,
    pub realm: String,
    pub co_signer_count: u32,
    pub fate_reason: Option<String>,
    pub status_token: StatusToken,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Petition> for PetitionStatusResponse {
    fn from(petition: Petition) -> Self {
        let status_token = StatusToken::compute(petition.content_hash.as_ref(), petition.state);
        Self {
            petition_id: petition.id,
            petition_type: petition.petition_type,
            state: petition.state,
            realm: petition.realm,
            co_signer_count: petition.co_signer_count,
            fate_reason: petition.fate_reason,
            status_token,
            created_at: petition.created_at,
            updated_at: petition.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub petition_id: PetitionId,
    pub state: PetitionState,
    pub fate_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueItemResponse {
    pub petition_id: PetitionId,
    pub petition_type: PetitionType,
    pub escalation_source: EscalationSource,
    pub co_signer_count: u32,
    pub escalated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub items: Vec<QueueItemResponse>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl From<EscalationQueuePage> for QueueResponse {
    fn from(page: EscalationQueuePage) -> Self {
        Self {
            items: page
                .items
                .into_iter()
                .map(|item| QueueItemResponse {
                    petition_id: item.petition_id,
                    petition_type: item.petition_type,
                    escalation_source: item.escalation_source,
                    co_signer_count: item.co_signer_count,
                    escalated_at: item.escalated_at,
                })
                .collect(),
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionPackageResponse {
    pub petition_id: PetitionId,
    #[serde(rename = "type")]
    pub petition_type: PetitionType,
    pub text: String,
    pub submitter_id: Option<SubmitterId>,
    pub co_signer_count: u32,
    pub created_at: DateTime<Utc>,
    pub escalation_source: EscalationSource,
    pub escalated_at: DateTime<Utc>,
    pub escalated_to_realm: String,
}

impl From<DecisionPackage> for DecisionPackageResponse {
    fn from(package: DecisionPackage) -> Self {
        Self {
            petition_id: package.petition_id,
            petition_type: package.petition_type,
            text: package.text,
            submitter_id: package.submitter_id,
            co_signer_count: package.co_signer_count,
            created_at: package.created_at,
            escalation_source: package.escalation.escalation_source,
            escalated_at: package.escalation.escalated_at,
            escalated_to_realm: package.escalation.escalated_to_realm,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AcknowledgmentResponse {
    pub acknowledgment_id: fates_types::AcknowledgmentId,
    pub petition_id: PetitionId,
    pub reason_code: fates_types::ReasonCode,
    pub rationale: Option<String>,
    pub acknowledged_by_king_id: Option<KingId>,
    pub acknowledged_at: DateTime<Utc>,
    pub witness_hash: String,
}

impl From<Acknowledgment> for AcknowledgmentResponse {
    fn from(ack: Acknowledgment) -> Self {
        Self {
            acknowledgment_id: ack.id,
            petition_id: ack.petition_id,
            reason_code: ack.reason_code,
            rationale: ack.rationale,
            acknowledged_by_king_id: ack.acknowledged_by_king_id,
            acknowledged_at: ack.acknowledged_at,
            witness_hash: ack.witness_hash,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub halted: bool,
}
