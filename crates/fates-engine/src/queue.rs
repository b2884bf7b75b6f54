//! King escalation queue and decision packages
//!
//! The queue is realm-scoped and FIFO: ascending `(escalated_at, id)`
//! with keyset pagination. The cursor is `base64("<rfc3339>:<uuid>")`;
//! a page fetches `limit + 1` rows to learn whether more remain.
//!
//! This read deliberately refuses access during halt: Kings act on what
//! they see here, and the queue must not feed decisions into a halted
//! system.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

use fates_store::PetitionRepository;
use fates_types::{
    EscalationSource, FatesError, KingId, PetitionId, PetitionState, PetitionType, Result,
    SubmitterId,
};

use crate::halt::{ensure_not_halted, HaltGate};

/// Default page size
pub const DEFAULT_QUEUE_LIMIT: u32 = 20;
/// Maximum page size
pub const MAX_QUEUE_LIMIT: u32 = 100;

/// One entry in a King's escalation queue
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationQueueItem {
    pub petition_id: PetitionId,
    pub petition_type: PetitionType,
    pub escalation_source: EscalationSource,
    pub co_signer_count: u32,
    pub escalated_at: DateTime<Utc>,
}

/// A page of the escalation queue
#[derive(Debug, Clone)]
pub struct EscalationQueuePage {
    pub items: Vec<EscalationQueueItem>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Build a keyset cursor from the last item of a page.
pub fn build_cursor(escalated_at: DateTime<Utc>, petition_id: PetitionId) -> String {
    BASE64.encode(format!("{}:{petition_id}", escalated_at.to_rfc3339()))
}

/// Parse a keyset cursor back into `(escalated_at, petition_id)`.
///
/// The timestamp itself contains colons, so the id is split off at the
/// last one.
pub fn parse_cursor(cursor: &str) -> Result<(DateTime<Utc>, PetitionId)> {
    let decoded = BASE64.decode(cursor).map_err(|e| FatesError::InvalidCursor {
        reason: format!("not base64: {e}"),
    })?;
    let decoded = String::from_utf8(decoded).map_err(|e| FatesError::InvalidCursor {
        reason: format!("not utf-8: {e}"),
    })?;
    let (time_str, id_str) = decoded.rsplit_once(':').ok_or(FatesError::InvalidCursor {
        reason: "missing ':' separator".to_string(),
    })?;
    let escalated_at = DateTime::parse_from_rfc3339(time_str)
        .map_err(|e| FatesError::InvalidCursor {
            reason: format!("bad timestamp: {e}"),
        })?
        .with_timezone(&Utc);
    let petition_id = PetitionId::parse(id_str).map_err(|e| FatesError::InvalidCursor {
        reason: format!("bad petition id: {e}"),
    })?;
    Ok((escalated_at, petition_id))
}

/// Realm-scoped, keyset-paginated view of escalated petitions
#[derive(Clone)]
pub struct EscalationQueueService {
    petitions: Arc<dyn PetitionRepository>,
    halt_gate: Arc<dyn HaltGate>,
}

impl EscalationQueueService {
    pub fn new(petitions: Arc<dyn PetitionRepository>, halt_gate: Arc<dyn HaltGate>) -> Self {
        Self {
            petitions,
            halt_gate,
        }
    }

    /// Fetch one page of a King's escalation queue.
    pub async fn get_queue(
        &self,
        king_id: KingId,
        realm_id: &str,
        cursor: Option<&str>,
        limit: Option<u32>,
    ) -> Result<EscalationQueuePage> {
        // The queue refuses any access during halt.
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        let limit = limit.unwrap_or(DEFAULT_QUEUE_LIMIT);
        if !(1..=MAX_QUEUE_LIMIT).contains(&limit) {
            return Err(FatesError::validation(
                "limit",
                format!("limit must be between 1 and {MAX_QUEUE_LIMIT}, got {limit}"),
            ));
        }

        let after = cursor.map(parse_cursor).transpose()?;

        tracing::debug!(
            king_id = %king_id,
            realm_id,
            has_cursor = after.is_some(),
            limit,
            "retrieving escalation queue",
        );

        // One extra row decides has_more.
        let mut petitions = self
            .petitions
            .list_escalated_by_realm(realm_id, after, limit + 1)
            .await?;

        let has_more = petitions.len() as u32 > limit;
        petitions.truncate(limit as usize);

        let items: Vec<EscalationQueueItem> = petitions
            .into_iter()
            .filter_map(|p| {
                let escalated_at = p.escalated_at?;
                Some(EscalationQueueItem {
                    petition_id: p.id,
                    petition_type: p.petition_type,
                    escalation_source: p
                        .escalation_source
                        .unwrap_or(EscalationSource::Deliberation),
                    co_signer_count: p.co_signer_count,
                    escalated_at,
                })
            })
            .collect();

        let next_cursor = if has_more {
            items
                .last()
                .map(|item| build_cursor(item.escalated_at, item.petition_id))
        } else {
            None
        };

        tracing::debug!(
            king_id = %king_id,
            item_count = items.len(),
            has_more,
            "escalation queue retrieved",
        );

        Ok(EscalationQueuePage {
            items,
            next_cursor,
            has_more,
        })
    }
}

// ============================================================================
// Decision Package
// ============================================================================

/// Escalation context of a decision package
#[derive(Debug, Clone)]
pub struct EscalationHistory {
    pub escalation_source: EscalationSource,
    pub escalated_at: DateTime<Utc>,
    pub escalated_to_realm: String,
}

/// Complete context a King needs to decide on an escalated petition
#[derive(Debug, Clone)]
pub struct DecisionPackage {
    pub petition_id: PetitionId,
    pub petition_type: PetitionType,
    pub text: String,
    pub submitter_id: Option<SubmitterId>,
    pub co_signer_count: u32,
    pub created_at: DateTime<Utc>,
    pub escalation: EscalationHistory,
}

/// Aggregates petition data and escalation history for King review
#[derive(Clone)]
pub struct DecisionPackageService {
    petitions: Arc<dyn PetitionRepository>,
}

impl DecisionPackageService {
    pub fn new(petitions: Arc<dyn PetitionRepository>) -> Self {
        Self { petitions }
    }

    /// Fetch the decision package for an escalated petition, enforcing
    /// realm-scoped access.
    pub async fn get_decision_package(
        &self,
        petition_id: PetitionId,
        king_realm: &str,
    ) -> Result<DecisionPackage> {
        let petition = self
            .petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })?;

        if petition.state != PetitionState::Escalated {
            return Err(FatesError::NotEscalated {
                petition_id,
                current_state: petition.state,
            });
        }

        let escalated_to_realm = petition.escalated_to_realm.clone().unwrap_or_default();
        if escalated_to_realm != king_realm {
            return Err(FatesError::RealmMismatch {
                expected: escalated_to_realm,
                actual: king_realm.to_string(),
            });
        }

        Ok(DecisionPackage {
            petition_id,
            petition_type: petition.petition_type,
            text: petition.text.clone(),
            submitter_id: petition.submitter_id,
            co_signer_count: petition.co_signer_count,
            created_at: petition.created_at,
            escalation: EscalationHistory {
                escalation_source: petition
                    .escalation_source
                    .unwrap_or(EscalationSource::Deliberation),
                escalated_at: petition.escalated_at.unwrap_or(petition.updated_at),
                escalated_to_realm,
            },
        })
    }
}
