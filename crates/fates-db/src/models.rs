//! Database row models and domain conversions
//!
//! Rows hold driver-native types (text enums, `BYTEA` hashes, `INT4[]`
//! archon seats); conversion into domain values goes through the domain
//! parsers so corrupt rows fail loudly instead of leaking bad states.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use fates_types::{
    Acknowledgment, AcknowledgmentId, ArchonId, EscalationSource, FatesError, KingId, MotionId,
    NotificationChannel, NotificationPreference, Petition, PetitionId, PetitionState, PetitionType,
    ReasonCode, Referral, ReferralId, ReferralStatus, Result, SubmitterId,
};

use fates_scheduler::{JobStatus, ScheduledJob};
use fates_types::JobId;

/// Petition row
#[derive(Debug, Clone, FromRow)]
pub struct DbPetition {
    pub id: Uuid,
    pub petition_type: String,
    pub text: String,
    pub state: String,
    pub submitter_id: Option<Uuid>,
    pub content_hash: Option<Vec<u8>>,
    pub realm: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fate_reason: Option<String>,
    pub co_signer_count: i32,
    pub escalation_source: Option<String>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalated_to_realm: Option<String>,
    pub adopted_as_motion_id: Option<Uuid>,
    pub adopted_at: Option<DateTime<Utc>>,
    pub adopted_by_king_id: Option<Uuid>,
}

impl DbPetition {
    pub fn into_domain(self) -> Result<Petition> {
        let content_hash = match self.content_hash {
            Some(bytes) => Some(bytes.as_slice().try_into().map_err(|_| {
                FatesError::internal(format!(
                    "petition {} content hash has {} bytes, expected 32",
                    self.id,
                    bytes.len()
                ))
            })?),
            None => None,
        };

        Ok(Petition {
            id: PetitionId::from_uuid(self.id),
            petition_type: PetitionType::parse(&self.petition_type)?,
            text: self.text,
            state: PetitionState::parse(&self.state)?,
            submitter_id: self.submitter_id.map(SubmitterId::from_uuid),
            content_hash,
            realm: self.realm,
            created_at: self.created_at,
            updated_at: self.updated_at,
            fate_reason: self.fate_reason,
            co_signer_count: self.co_signer_count.max(0) as u32,
            escalation_source: self
                .escalation_source
                .as_deref()
                .map(EscalationSource::parse)
                .transpose()?,
            escalated_at: self.escalated_at,
            escalated_to_realm: self.escalated_to_realm,
            adopted_as_motion_id: self.adopted_as_motion_id.map(MotionId::from_uuid),
            adopted_at: self.adopted_at,
            adopted_by_king_id: self.adopted_by_king_id.map(KingId::from_uuid),
        })
    }
}

/// Acknowledgment row
#[derive(Debug, Clone, FromRow)]
pub struct DbAcknowledgment {
    pub id: Uuid,
    pub petition_id: Uuid,
    pub reason_code: String,
    pub rationale: Option<String>,
    pub reference_petition_id: Option<Uuid>,
    pub acknowledging_archon_ids: Vec<i32>,
    pub acknowledged_by_king_id: Option<Uuid>,
    pub acknowledged_at: DateTime<Utc>,
    pub witness_hash: String,
}

impl DbAcknowledgment {
    pub fn into_domain(self) -> Result<Acknowledgment> {
        Acknowledgment::new(
            AcknowledgmentId::from_uuid(self.id),
            PetitionId::from_uuid(self.petition_id),
            ReasonCode::parse(&self.reason_code)?,
            self.rationale,
            self.reference_petition_id.map(PetitionId::from_uuid),
            self.acknowledging_archon_ids
                .into_iter()
                .map(|seat| ArchonId(seat.max(0) as u32))
                .collect(),
            self.acknowledged_by_king_id.map(KingId::from_uuid),
            self.acknowledged_at,
            self.witness_hash,
        )
    }
}

/// Referral row
#[derive(Debug, Clone, FromRow)]
pub struct DbReferral {
    pub id: Uuid,
    pub petition_id: Uuid,
    pub realm_id: String,
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub witness_hash: String,
}

impl DbReferral {
    pub fn into_domain(self) -> Result<Referral> {
        Ok(Referral {
            id: ReferralId::from_uuid(self.id),
            petition_id: PetitionId::from_uuid(self.petition_id),
            realm_id: self.realm_id,
            deadline: self.deadline,
            created_at: self.created_at,
            status: ReferralStatus::parse(&self.status)?,
            witness_hash: self.witness_hash,
        })
    }
}

/// Scheduled job row
#[derive(Debug, Clone, FromRow)]
pub struct DbScheduledJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub status: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl DbScheduledJob {
    pub fn into_domain(self) -> Result<ScheduledJob> {
        Ok(ScheduledJob {
            id: JobId::from_uuid(self.id),
            job_type: self.job_type,
            payload: self.payload,
            run_at: self.run_at,
            status: JobStatus::parse(&self.status)?,
            attempts: self.attempts.max(0) as u32,
            created_at: self.created_at,
        })
    }
}

/// Notification preference row
#[derive(Debug, Clone, FromRow)]
pub struct DbNotificationPreference {
    pub id: Uuid,
    pub petition_id: Uuid,
    pub channel: String,
    pub webhook_url: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl DbNotificationPreference {
    pub fn into_domain(self) -> Result<NotificationPreference> {
        let channel = match self.channel.as_str() {
            "WEBHOOK" => NotificationChannel::Webhook {
                url: self.webhook_url.unwrap_or_default(),
            },
            "IN_APP" => NotificationChannel::InApp,
            other => {
                return Err(FatesError::internal(format!(
                    "unknown notification channel: {other}"
                )))
            }
        };
        Ok(NotificationPreference {
            id: self.id,
            petition_id: PetitionId::from_uuid(self.petition_id),
            channel,
            enabled: self.enabled,
            created_at: self.created_at,
        })
    }
}
