//! Petition domain model and lifecycle state machine
//!
//! A petition moves through a fixed lifecycle and terminates in exactly one
//! of the Five Fates. The transition matrix is the single source of truth
//! for which moves are legal:
//!
//! ```text
//! RECEIVED     -> DELIBERATING | ACKNOWLEDGED | ESCALATED
//! DELIBERATING -> ACKNOWLEDGED | REFERRED | ESCALATED | DEFERRED | NO_RESPONSE
//! terminal     -> (none)
//! ```
//!
//! RECEIVED -> ESCALATED exists so co-signer thresholds can bypass
//! deliberation; RECEIVED -> ACKNOWLEDGED exists for submitter withdrawal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FatesError, Result};
use crate::identity::{KingId, MotionId, PetitionId, SubmitterId};

/// Maximum petition text length in characters
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Type of petition submitted to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetitionType {
    /// General governance petition
    General,
    /// Request for system cessation review
    Cessation,
    /// Complaint about system behavior
    Grievance,
    /// Request for inter-realm collaboration
    Collaboration,
    /// Petition about the petition system itself
    Meta,
}

impl PetitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Cessation => "CESSATION",
            Self::Grievance => "GRIEVANCE",
            Self::Collaboration => "COLLABORATION",
            Self::Meta => "META",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "GENERAL" => Ok(Self::General),
            "CESSATION" => Ok(Self::Cessation),
            "GRIEVANCE" => Ok(Self::Grievance),
            "COLLABORATION" => Ok(Self::Collaboration),
            "META" => Ok(Self::Meta),
            other => Err(FatesError::validation(
                "type",
                format!("unknown petition type: {other}"),
            )),
        }
    }
}

impl fmt::Display for PetitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State in the petition lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetitionState {
    /// Initial state after submission
    Received,
    /// Deliberation in progress
    Deliberating,
    /// Petition acknowledged (terminal fate)
    Acknowledged,
    /// Referred to a Knight for review (terminal fate)
    Referred,
    /// Escalated to a King (terminal fate)
    Escalated,
    /// Deferred for later consideration (terminal fate)
    Deferred,
    /// No response disposition (terminal fate)
    NoResponse,
}

/// The Five Fates - terminal states a petition can end in
pub const TERMINAL_STATES: [PetitionState; 5] = [
    PetitionState::Acknowledged,
    PetitionState::Referred,
    PetitionState::Escalated,
    PetitionState::Deferred,
    PetitionState::NoResponse,
];

impl PetitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Deliberating => "DELIBERATING",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Referred => "REFERRED",
            Self::Escalated => "ESCALATED",
            Self::Deferred => "DEFERRED",
            Self::NoResponse => "NO_RESPONSE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "RECEIVED" => Ok(Self::Received),
            "DELIBERATING" => Ok(Self::Deliberating),
            "ACKNOWLEDGED" => Ok(Self::Acknowledged),
            "REFERRED" => Ok(Self::Referred),
            "ESCALATED" => Ok(Self::Escalated),
            "DEFERRED" => Ok(Self::Deferred),
            "NO_RESPONSE" => Ok(Self::NoResponse),
            other => Err(FatesError::validation(
                "state",
                format!("unknown petition state: {other}"),
            )),
        }
    }

    /// Whether this state is one of the Five Fates.
    ///
    /// Once a petition reaches a terminal state, no further transitions
    /// are permitted.
    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATES.contains(self)
    }

    /// States this state can transition to. Empty for terminal states.
    pub fn valid_transitions(&self) -> &'static [PetitionState] {
        match self {
            Self::Received => &[
                PetitionState::Deliberating,
                PetitionState::Acknowledged,
                PetitionState::Escalated,
            ],
            Self::Deliberating => &[
                PetitionState::Acknowledged,
                PetitionState::Referred,
                PetitionState::Escalated,
                PetitionState::Deferred,
                PetitionState::NoResponse,
            ],
            _ => &[],
        }
    }

    /// Whether moving to `target` is allowed by the transition matrix.
    pub fn can_transition_to(&self, target: PetitionState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for PetitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What triggered an escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationSource {
    /// Deliberation reached the ESCALATE disposition
    Deliberation,
    /// Co-signer threshold reached, bypassing deliberation
    CoSignerThreshold,
    /// A Knight recommended escalation
    KnightRecommendation,
}

impl EscalationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deliberation => "DELIBERATION",
            Self::CoSignerThreshold => "CO_SIGNER_THRESHOLD",
            Self::KnightRecommendation => "KNIGHT_RECOMMENDATION",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "DELIBERATION" => Ok(Self::Deliberation),
            "CO_SIGNER_THRESHOLD" => Ok(Self::CoSignerThreshold),
            "KNIGHT_RECOMMENDATION" => Ok(Self::KnightRecommendation),
            other => Err(FatesError::validation(
                "escalation_source",
                format!("unknown escalation source: {other}"),
            )),
        }
    }
}

impl fmt::Display for EscalationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A petition submitted for Three Fates deliberation.
///
/// Petitions are value objects: every change produces a new instance, and
/// the authoritative current state lives only in the petition store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Petition {
    pub id: PetitionId,
    pub petition_type: PetitionType,
    pub text: String,
    pub state: PetitionState,
    /// Identity of the submitter; absent for anonymous petitions, which
    /// are ineligible for withdrawal.
    pub submitter_id: Option<SubmitterId>,
    /// 32-byte blake3 digest over the UTF-8 text
    pub content_hash: Option<[u8; 32]>,
    /// Routing realm for processing
    pub realm: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reason recorded when entering a terminal state
    pub fate_reason: Option<String>,
    /// Monotonically non-decreasing while the petition is non-terminal
    pub co_signer_count: u32,
    // Escalation triple: populated atomically when state becomes ESCALATED
    pub escalation_source: Option<EscalationSource>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub escalated_to_realm: Option<String>,
    // Adoption triple: set at most once, immutable thereafter
    pub adopted_as_motion_id: Option<MotionId>,
    pub adopted_at: Option<DateTime<Utc>>,
    pub adopted_by_king_id: Option<KingId>,
}

impl Petition {
    /// Create a new petition in RECEIVED state.
    ///
    /// Validates text length and content hash size.
    pub fn new(
        id: PetitionId,
        petition_type: PetitionType,
        text: impl Into<String>,
        submitter_id: Option<SubmitterId>,
        content_hash: Option<[u8; 32]>,
        realm: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let text = text.into();
        validate_text(&text)?;

        Ok(Self {
            id,
            petition_type,
            text,
            state: PetitionState::Received,
            submitter_id,
            content_hash,
            realm: realm.into(),
            created_at,
            updated_at: created_at,
            fate_reason: None,
            co_signer_count: 0,
            escalation_source: None,
            escalated_at: None,
            escalated_to_realm: None,
            adopted_as_motion_id: None,
            adopted_at: None,
            adopted_by_king_id: None,
        })
    }

    /// Produce a copy in `new_state`, enforcing the transition matrix.
    ///
    /// For terminal targets an optional fate reason is recorded.
    pub fn with_state(&self, new_state: PetitionState, reason: Option<String>) -> Result<Self> {
        if self.state.is_terminal() {
            return Err(FatesError::AlreadyFated {
                petition_id: self.id,
                terminal_state: self.state,
            });
        }
        if !self.state.can_transition_to(new_state) {
            return Err(FatesError::InvalidStateTransition {
                from: self.state,
                to: new_state,
                allowed: self.state.valid_transitions().to_vec(),
            });
        }

        let mut updated = self.clone();
        updated.state = new_state;
        updated.updated_at = Utc::now();
        if reason.is_some() {
            updated.fate_reason = reason;
        }
        Ok(updated)
    }

    /// Produce a copy with the escalation triple populated.
    ///
    /// Existing escalation fields are preserved (COALESCE semantics): an
    /// escalation already on record is never overwritten.
    pub fn with_escalation(
        &self,
        source: EscalationSource,
        escalated_to_realm: impl Into<String>,
        escalated_at: DateTime<Utc>,
    ) -> Self {
        let mut updated = self.clone();
        updated.escalation_source = updated.escalation_source.or(Some(source));
        updated.escalated_at = updated.escalated_at.or(Some(escalated_at));
        if updated.escalated_to_realm.is_none() {
            updated.escalated_to_realm = Some(escalated_to_realm.into());
        }
        updated.updated_at = Utc::now();
        updated
    }

    /// Produce a copy with the adoption triple set.
    ///
    /// The adoption triple is write-once: a second call fails.
    pub fn with_adoption(
        &self,
        motion_id: MotionId,
        king_id: KingId,
        adopted_at: DateTime<Utc>,
    ) -> Result<Self> {
        if let Some(existing) = self.adopted_as_motion_id {
            return Err(FatesError::AlreadyAdopted {
                petition_id: self.id,
                motion_id: existing,
            });
        }

        let mut updated = self.clone();
        updated.adopted_as_motion_id = Some(motion_id);
        updated.adopted_at = Some(adopted_at);
        updated.adopted_by_king_id = Some(king_id);
        updated.updated_at = Utc::now();
        Ok(updated)
    }

    /// Produce a copy with the content hash set.
    pub fn with_content_hash(&self, content_hash: [u8; 32]) -> Self {
        let mut updated = self.clone();
        updated.content_hash = Some(content_hash);
        updated
    }

    /// Canonical bytes for content hashing: the UTF-8 petition text.
    pub fn canonical_content_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

/// Validate petition text length: non-empty, at most [`MAX_TEXT_LENGTH`] chars.
pub fn validate_text(text: &str) -> Result<()> {
    let len = text.chars().count();
    if len == 0 {
        return Err(FatesError::validation("text", "petition text is empty"));
    }
    if len > MAX_TEXT_LENGTH {
        return Err(FatesError::validation(
            "text",
            format!("petition text exceeds maximum length of {MAX_TEXT_LENGTH} characters"),
        ));
    }
    Ok(())
}
