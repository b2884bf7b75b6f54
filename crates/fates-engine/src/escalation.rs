//! Co-signer thresholds and auto-escalation
//!
//! The detector is a pure calculation: compare a co-signer count against
//! the per-type threshold table (CESSATION = 100, GRIEVANCE = 50, others
//! none). The executor performs the escalation: atomic CAS to ESCALATED
//! with the escalation triple, an `petition.escalation.triggered` event,
//! and cancellation of any in-flight deliberation.
//!
//! Idempotency guarantee: two concurrent triggers on the same petition
//! produce exactly one successful escalation; the loser observes
//! `already_escalated = true`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use fates_ledger::{event_types, EventWriter};
use fates_store::PetitionRepository;
use fates_types::{
    EscalationId, EscalationSource, EventId, FatesError, PetitionId, PetitionState, PetitionType,
    Result, SessionId, SignerId,
};

use crate::config::EngineConfig;
use crate::coordinator::FateCoordinator;
use crate::events::{CancelReason, DeliberationCancelledEvent, EscalationTriggeredEvent};
use crate::halt::{ensure_not_halted, HaltGate};
use crate::ports::SessionDirectory;

/// Trigger type recorded on co-signer threshold escalations
pub const TRIGGER_CO_SIGNER_THRESHOLD: &str = "CO_SIGNER_THRESHOLD";

// ============================================================================
// Threshold Detector
// ============================================================================

/// Result of a threshold check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdCheck {
    pub reached: bool,
    pub threshold: Option<u32>,
    pub petition_type: PetitionType,
    pub current_count: u32,
}

/// Pure per-type co-signer threshold table
#[derive(Debug, Clone, Copy)]
pub struct ThresholdDetector {
    cessation_threshold: u32,
    grievance_threshold: u32,
}

impl ThresholdDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cessation_threshold: config.cessation_threshold,
            grievance_threshold: config.grievance_threshold,
        }
    }

    /// The escalation threshold for a petition type, if it has one.
    pub fn threshold_for(&self, petition_type: PetitionType) -> Option<u32> {
        match petition_type {
            PetitionType::Cessation => Some(self.cessation_threshold),
            PetitionType::Grievance => Some(self.grievance_threshold),
            _ => None,
        }
    }

    /// Check whether `co_signer_count` reaches the type's threshold.
    /// No I/O and no side effects.
    pub fn check(&self, petition_type: PetitionType, co_signer_count: u32) -> ThresholdCheck {
        let threshold = self.threshold_for(petition_type);
        let reached = threshold.map(|t| co_signer_count >= t).unwrap_or(false);
        if reached {
            tracing::info!(
                petition_type = %petition_type,
                threshold = threshold.unwrap_or(0),
                current_count = co_signer_count,
                "escalation threshold reached",
            );
        }
        ThresholdCheck {
            reached,
            threshold,
            petition_type,
            current_count: co_signer_count,
        }
    }
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

// ============================================================================
// Auto-Escalation Executor
// ============================================================================

/// Outcome of an auto-escalation attempt
#[derive(Debug, Clone)]
pub struct AutoEscalationResult {
    pub escalation_id: Option<EscalationId>,
    pub petition_id: PetitionId,
    pub triggered: bool,
    pub event_id: Option<EventId>,
    pub timestamp: DateTime<Utc>,
    pub already_escalated: bool,
    pub trigger_type: String,
    pub co_signer_count: u32,
    pub threshold: u32,
}

impl AutoEscalationResult {
    fn not_triggered(
        petition_id: PetitionId,
        already_escalated: bool,
        trigger_type: &str,
        co_signer_count: u32,
        threshold: u32,
    ) -> Self {
        Self {
            escalation_id: None,
            petition_id,
            triggered: false,
            event_id: None,
            timestamp: Utc::now(),
            already_escalated,
            trigger_type: trigger_type.to_string(),
            co_signer_count,
            threshold,
        }
    }
}

/// Executes auto-escalation when a threshold is reached
#[derive(Clone)]
pub struct AutoEscalationExecutor {
    petitions: Arc<dyn PetitionRepository>,
    coordinator: FateCoordinator,
    event_writer: Option<Arc<dyn EventWriter>>,
    halt_gate: Arc<dyn HaltGate>,
    sessions: Option<Arc<dyn SessionDirectory>>,
}

impl AutoEscalationExecutor {
    pub fn new(
        petitions: Arc<dyn PetitionRepository>,
        coordinator: FateCoordinator,
        event_writer: Option<Arc<dyn EventWriter>>,
        halt_gate: Arc<dyn HaltGate>,
    ) -> Self {
        Self {
            petitions,
            coordinator,
            event_writer,
            halt_gate,
            sessions: None,
        }
    }

    pub fn with_session_directory(mut self, sessions: Arc<dyn SessionDirectory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Execute auto-escalation for a petition whose threshold was reached.
    pub async fn execute(
        &self,
        petition_id: PetitionId,
        trigger_type: &str,
        co_signer_count: u32,
        threshold: u32,
        triggered_by: Option<SignerId>,
    ) -> Result<AutoEscalationResult> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        tracing::info!(
            petition_id = %petition_id,
            trigger_type,
            co_signer_count,
            threshold,
            "auto-escalation started",
        );

        let petition = self
            .petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })?;

        // Idempotency: already escalated is a success for the caller.
        if petition.state == PetitionState::Escalated {
            tracing::info!(petition_id = %petition_id, "petition already escalated");
            return Ok(AutoEscalationResult::not_triggered(
                petition_id,
                true,
                trigger_type,
                co_signer_count,
                threshold,
            ));
        }
        if !matches!(
            petition.state,
            PetitionState::Received | PetitionState::Deliberating
        ) {
            tracing::warn!(
                petition_id = %petition_id,
                current_state = %petition.state,
                "petition not eligible for auto-escalation",
            );
            return Ok(AutoEscalationResult::not_triggered(
                petition_id,
                false,
                trigger_type,
                co_signer_count,
                threshold,
            ));
        }

        let escalation_id = EscalationId::new();
        let triggered_at = Utc::now();

        // An in-flight deliberation is cancelled by the escalation; the
        // cancellation event is built before the CAS so a validation
        // failure surfaces before any state moves.
        let cancellation = if petition.state == PetitionState::Deliberating {
            let session = match self.sessions.as_ref() {
                Some(sessions) => sessions.session_for_petition(petition_id).await?,
                None => None,
            };
            let (session_id, participating_archons) = match session {
                Some(session) => (session.session_id, session.participating_archons),
                None => (SessionId::new(), vec![]),
            };
            Some(DeliberationCancelledEvent::new(
                session_id,
                petition_id,
                CancelReason::AutoEscalated,
                triggered_at,
                triggered_by,
                participating_archons,
                Some(escalation_id),
            )?)
        } else {
            None
        };

        // Atomic transition with the escalation triple; the fate event is
        // paired by the coordinator.
        let escalated = match self
            .coordinator
            .assign_escalation_transactional(
                petition_id,
                petition.state,
                EscalationSource::CoSignerThreshold,
                petition.realm.clone(),
                "threshold-detector",
                Some(format!("{trigger_type} at {co_signer_count}/{threshold}")),
            )
            .await
        {
            Ok(petition) => petition,
            // A concurrent trigger won the race; report idempotent success.
            Err(FatesError::AlreadyFated {
                terminal_state: PetitionState::Escalated,
                ..
            })
            | Err(FatesError::ConcurrentModification {
                actual: PetitionState::Escalated,
                ..
            }) => {
                tracing::info!(petition_id = %petition_id, "lost escalation race, already escalated");
                return Ok(AutoEscalationResult::not_triggered(
                    petition_id,
                    true,
                    trigger_type,
                    co_signer_count,
                    threshold,
                ));
            }
            Err(err) => return Err(err),
        };

        let mut event_id = None;
        if let Some(writer) = self.event_writer.as_ref() {
            let event = EscalationTriggeredEvent {
                escalation_id,
                petition_id,
                trigger_type: trigger_type.to_string(),
                co_signer_count,
                threshold,
                triggered_at,
                triggered_by,
                petition_type: escalated.petition_type,
                escalation_source: EscalationSource::CoSignerThreshold,
                realm_id: escalated.realm.clone(),
            };
            match event.payload() {
                Ok(payload) => match writer.write(event_types::ESCALATION_TRIGGERED, payload).await
                {
                    Ok(record) => event_id = Some(record.event_id),
                    Err(err) => {
                        tracing::warn!(
                            petition_id = %petition_id,
                            error = %err,
                            "escalation trigger event emission failed",
                        );
                    }
                },
                Err(err) => {
                    tracing::warn!(petition_id = %petition_id, error = %err, "event payload build failed");
                }
            }

            if let Some(cancellation) = cancellation {
                match cancellation.payload() {
                    Ok(payload) => {
                        if let Err(err) = writer
                            .write(event_types::DELIBERATION_CANCELLED, payload)
                            .await
                        {
                            tracing::warn!(
                                petition_id = %petition_id,
                                error = %err,
                                "deliberation cancellation event emission failed",
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(petition_id = %petition_id, error = %err, "event payload build failed");
                    }
                }
            }
        }

        tracing::info!(
            petition_id = %petition_id,
            escalation_id = %escalation_id,
            realm = %escalated.realm,
            "auto-escalation completed",
        );

        Ok(AutoEscalationResult {
            escalation_id: Some(escalation_id),
            petition_id,
            triggered: true,
            event_id,
            timestamp: triggered_at,
            already_escalated: false,
            trigger_type: trigger_type.to_string(),
            co_signer_count,
            threshold,
        })
    }
}

// ============================================================================
// Co-Sign Service
// ============================================================================

/// Outcome of a co-sign
#[derive(Debug, Clone)]
pub struct CoSignResult {
    pub petition_id: PetitionId,
    pub co_signer_count: u32,
    /// Present when this signature tripped the threshold
    pub escalation: Option<AutoEscalationResult>,
}

/// Records co-signatures and fires the threshold check on each one
#[derive(Clone)]
pub struct CoSignService {
    petitions: Arc<dyn PetitionRepository>,
    detector: ThresholdDetector,
    escalation: AutoEscalationExecutor,
    halt_gate: Arc<dyn HaltGate>,
}

impl CoSignService {
    pub fn new(
        petitions: Arc<dyn PetitionRepository>,
        detector: ThresholdDetector,
        escalation: AutoEscalationExecutor,
        halt_gate: Arc<dyn HaltGate>,
    ) -> Self {
        Self {
            petitions,
            detector,
            escalation,
            halt_gate,
        }
    }

    /// Add a co-signature, then check the threshold and escalate if it
    /// was reached.
    pub async fn cosign(&self, petition_id: PetitionId, signer_id: SignerId) -> Result<CoSignResult> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        let petition = self
            .petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })?;

        let count = self.petitions.add_co_signer(petition_id, signer_id).await?;
        tracing::debug!(petition_id = %petition_id, co_signer_count = count, "co-signature recorded");

        let check = self.detector.check(petition.petition_type, count);
        let escalation = if check.reached {
            let threshold = check.threshold.unwrap_or(0);
            Some(
                self.escalation
                    .execute(
                        petition_id,
                        TRIGGER_CO_SIGNER_THRESHOLD,
                        count,
                        threshold,
                        Some(signer_id),
                    )
                    .await?,
            )
        } else {
            None
        };

        Ok(CoSignResult {
            petition_id,
            co_signer_count: count,
            escalation,
        })
    }
}
