//! Acknowledgment execution - Marquis, King, and system paths
//!
//! Three entry points share validation and event emission:
//!
//! - Marquis: at least 2 of 3 archon seats, DELIBERATING petitions,
//!   dwell-time enforced
//! - King: single actor, ESCALATED petitions, realm-scoped, rationale
//!   of at least 100 characters
//! - System: EXPIRED / KNIGHT_REFERRAL from the referral workflow,
//!   bypasses quorum and dwell

use std::sync::Arc;

use chrono::Utc;

use fates_crypto::{format_witness_hash, king_witness_content, marquis_witness_content, ContentHasher};
use fates_ledger::{event_types, EventWriter};
use fates_store::{AcknowledgmentRepository, PetitionRepository};
use fates_types::{
    validate_reason_requirements, Acknowledgment, AcknowledgmentId, ArchonId, FatesError, KingId,
    PetitionId, PetitionState, ReasonCode, Result, MIN_ACKNOWLEDGING_ARCHONS,
    MIN_KING_RATIONALE_LENGTH,
};

use crate::config::EngineConfig;
use crate::coordinator::FateCoordinator;
use crate::events::{KingAcknowledgedEscalationEvent, PetitionAcknowledgedEvent};
use crate::halt::{ensure_not_halted, HaltGate};
use crate::ports::SessionDirectory;

/// Executes petition acknowledgments
#[derive(Clone)]
pub struct AcknowledgmentExecutor {
    acknowledgments: Arc<dyn AcknowledgmentRepository>,
    petitions: Arc<dyn PetitionRepository>,
    coordinator: FateCoordinator,
    event_writer: Option<Arc<dyn EventWriter>>,
    halt_gate: Arc<dyn HaltGate>,
    hasher: ContentHasher,
    sessions: Option<Arc<dyn SessionDirectory>>,
    config: EngineConfig,
}

impl AcknowledgmentExecutor {
    pub fn new(
        acknowledgments: Arc<dyn AcknowledgmentRepository>,
        petitions: Arc<dyn PetitionRepository>,
        coordinator: FateCoordinator,
        event_writer: Option<Arc<dyn EventWriter>>,
        halt_gate: Arc<dyn HaltGate>,
        config: EngineConfig,
    ) -> Self {
        Self {
            acknowledgments,
            petitions,
            coordinator,
            event_writer,
            halt_gate,
            hasher: ContentHasher::new(),
            sessions: None,
            config,
        }
    }

    pub fn with_session_directory(mut self, sessions: Arc<dyn SessionDirectory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Marquis acknowledgment of a deliberating petition.
    pub async fn execute(
        &self,
        petition_id: PetitionId,
        reason_code: ReasonCode,
        archon_ids: Vec<ArchonId>,
        rationale: Option<String>,
        reference_petition_id: Option<PetitionId>,
    ) -> Result<Acknowledgment> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        tracing::info!(
            petition_id = %petition_id,
            reason_code = %reason_code,
            archon_count = archon_ids.len(),
            "acknowledgment execution started",
        );

        // Archon quorum, except for system-triggered codes.
        if !reason_code.is_system() && archon_ids.len() < MIN_ACKNOWLEDGING_ARCHONS {
            return Err(FatesError::validation(
                "acknowledging_archon_ids",
                format!(
                    "at least {MIN_ACKNOWLEDGING_ARCHONS} archons must acknowledge, got {}",
                    archon_ids.len()
                ),
            ));
        }

        validate_reason_requirements(reason_code, rationale.as_deref(), reference_petition_id)?;

        let petition = self
            .petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })?;

        // Idempotency before the state check: a completed acknowledgment
        // leaves the petition terminal, and a re-delivered consensus must
        // still get the original record back.
        if let Some(existing) = self.acknowledgments.get_by_petition(petition_id).await? {
            tracing::info!(
                petition_id = %petition_id,
                acknowledgment_id = %existing.id,
                "acknowledgment already exists, returning existing",
            );
            return Ok(existing);
        }

        // System codes arrive from the referral workflow and may act on
        // REFERRED petitions; everything else requires DELIBERATING.
        let state_ok = petition.state == PetitionState::Deliberating
            || (reason_code.is_system() && petition.state == PetitionState::Referred);
        if !state_ok {
            return Err(FatesError::validation(
                "state",
                format!(
                    "petition must be DELIBERATING to acknowledge (currently {})",
                    petition.state
                ),
            ));
        }

        if !reason_code.is_system() {
            self.enforce_dwell_time(petition_id).await?;
        }

        // DUPLICATE must reference a petition that exists.
        if let Some(reference) = reference_petition_id {
            if self.petitions.get(reference).await?.is_none() {
                return Err(FatesError::validation(
                    "reference_petition_id",
                    format!("reference petition {reference} does not exist"),
                ));
            }
        }

        let acknowledgment_id = AcknowledgmentId::new();
        let acknowledged_at = Utc::now();
        let witness_content = marquis_witness_content(
            acknowledgment_id,
            petition_id,
            reason_code,
            &archon_ids,
            acknowledged_at,
            rationale.as_deref(),
            reference_petition_id,
        );
        let witness_hash = format_witness_hash(&self.hasher.hash_text(&witness_content));

        let acknowledgment = Acknowledgment::new(
            acknowledgment_id,
            petition_id,
            reason_code,
            rationale.clone(),
            reference_petition_id,
            archon_ids.clone(),
            None,
            acknowledged_at,
            witness_hash.clone(),
        )?;

        self.acknowledgments.save(&acknowledgment).await?;

        // Drive the petition to ACKNOWLEDGED through the coordinator.
        let actor = if reason_code.is_system() {
            "system".to_string()
        } else {
            "marquis".to_string()
        };
        if petition.state == PetitionState::Referred {
            self.coordinator
                .resolve_referred_petition(petition_id, &actor, Some(reason_code.as_str().to_string()))
                .await?;
        } else {
            self.coordinator
                .assign_fate_transactional(
                    petition_id,
                    petition.state,
                    PetitionState::Acknowledged,
                    &actor,
                    Some(reason_code.as_str().to_string()),
                )
                .await?;
        }

        self.emit_acknowledged_event(&acknowledgment).await;

        tracing::info!(
            petition_id = %petition_id,
            acknowledgment_id = %acknowledgment_id,
            witness_hash = %acknowledgment.witness_hash,
            "acknowledgment execution completed",
        );
        Ok(acknowledgment)
    }

    /// System-triggered acknowledgment from the referral workflow.
    ///
    /// Bypasses the archon quorum and the dwell check; accepts REFERRED
    /// petitions.
    pub async fn execute_system_acknowledge(
        &self,
        petition_id: PetitionId,
        reason_code: ReasonCode,
        rationale: String,
    ) -> Result<Acknowledgment> {
        if !reason_code.is_system() {
            return Err(FatesError::validation(
                "reason_code",
                format!("system acknowledgment accepts EXPIRED or KNIGHT_REFERRAL, got {reason_code}"),
            ));
        }
        self.execute(petition_id, reason_code, vec![], Some(rationale), None)
            .await
    }

    /// King acknowledgment of an escalated petition.
    ///
    /// The petition stays ESCALATED (terminal states are immutable); the
    /// acknowledgment record and its event close out the escalation.
    pub async fn execute_king_acknowledge(
        &self,
        petition_id: PetitionId,
        king_id: KingId,
        reason_code: ReasonCode,
        rationale: String,
        realm_id: &str,
    ) -> Result<Acknowledgment> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        // Kings carry a higher bar for explaining decisions to petitioners.
        let trimmed_len = rationale.trim().chars().count();
        if trimmed_len < MIN_KING_RATIONALE_LENGTH {
            return Err(FatesError::validation(
                "rationale",
                format!(
                    "King acknowledgment requires rationale of at least {MIN_KING_RATIONALE_LENGTH} characters, got {trimmed_len}"
                ),
            ));
        }

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

        // Realm-scoped authorization.
        let escalated_realm = petition.escalated_to_realm.clone().unwrap_or_default();
        if escalated_realm != realm_id {
            tracing::warn!(
                petition_id = %petition_id,
                king_id = %king_id,
                expected_realm = %escalated_realm,
                actual_realm = %realm_id,
                "king acknowledgment rejected: realm mismatch",
            );
            return Err(FatesError::RealmMismatch {
                expected: escalated_realm,
                actual: realm_id.to_string(),
            });
        }

        validate_reason_requirements(reason_code, Some(&rationale), None)?;

        // A second attempt is an error, not an idempotent return.
        if let Some(existing) = self.acknowledgments.get_by_petition(petition_id).await? {
            return Err(FatesError::AcknowledgmentAlreadyExists {
                petition_id,
                acknowledgment_id: existing.id,
            });
        }

        let acknowledgment_id = AcknowledgmentId::new();
        let acknowledged_at = Utc::now();
        let witness_content = king_witness_content(
            acknowledgment_id,
            petition_id,
            king_id,
            reason_code,
            acknowledged_at,
            realm_id,
            Some(&rationale),
        );
        let witness_hash = format_witness_hash(&self.hasher.hash_text(&witness_content));

        let acknowledgment = Acknowledgment::new(
            acknowledgment_id,
            petition_id,
            reason_code,
            Some(rationale.clone()),
            None,
            vec![],
            Some(king_id),
            acknowledged_at,
            witness_hash.clone(),
        )?;

        self.acknowledgments.save(&acknowledgment).await?;

        if let Some(writer) = self.event_writer.as_ref() {
            let event = KingAcknowledgedEscalationEvent {
                acknowledgment_id,
                petition_id,
                king_id,
                reason_code,
                rationale,
                acknowledged_at,
                realm_id: realm_id.to_string(),
                witness_hash,
            };
            match event.payload() {
                Ok(payload) => {
                    if let Err(err) = writer
                        .write(event_types::KING_ACKNOWLEDGED_ESCALATION, payload)
                        .await
                    {
                        tracing::warn!(
                            petition_id = %petition_id,
                            error = %err,
                            "king acknowledgment event emission failed",
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(petition_id = %petition_id, error = %err, "event payload build failed");
                }
            }
        }

        tracing::info!(
            petition_id = %petition_id,
            king_id = %king_id,
            reason_code = %reason_code,
            realm_id,
            "king acknowledged escalation",
        );
        Ok(acknowledgment)
    }

    /// Fetch an acknowledgment by id.
    pub async fn get_acknowledgment(&self, id: AcknowledgmentId) -> Result<Option<Acknowledgment>> {
        self.acknowledgments.get(id).await
    }

    /// Fetch the acknowledgment for a petition.
    pub async fn get_acknowledgment_by_petition(
        &self,
        petition_id: PetitionId,
    ) -> Result<Option<Acknowledgment>> {
        self.acknowledgments.get_by_petition(petition_id).await
    }

    async fn enforce_dwell_time(&self, petition_id: PetitionId) -> Result<()> {
        // Skipped when disabled or when no session directory is wired.
        if !self.config.dwell_enabled() {
            return Ok(());
        }
        let Some(sessions) = self.sessions.as_ref() else {
            return Ok(());
        };

        let session = sessions
            .session_for_petition(petition_id)
            .await?
            .ok_or_else(|| {
                FatesError::validation(
                    "session",
                    format!("no deliberation session found for petition {petition_id}"),
                )
            })?;

        let elapsed = (Utc::now() - session.created_at).num_seconds().max(0) as u64;
        if elapsed < self.config.min_dwell_seconds {
            let remaining = self.config.min_dwell_seconds - elapsed;
            tracing::warn!(
                petition_id = %petition_id,
                elapsed_seconds = elapsed,
                min_dwell_seconds = self.config.min_dwell_seconds,
                "dwell time not elapsed",
            );
            return Err(FatesError::DwellTimeNotElapsed {
                petition_id,
                remaining_seconds: remaining,
            });
        }
        Ok(())
    }

    async fn emit_acknowledged_event(&self, acknowledgment: &Acknowledgment) {
        let Some(writer) = self.event_writer.as_ref() else {
            return;
        };
        let event = PetitionAcknowledgedEvent {
            acknowledgment_id: acknowledgment.id,
            petition_id: acknowledgment.petition_id,
            reason_code: acknowledgment.reason_code,
            acknowledging_archon_ids: acknowledgment.acknowledging_archon_ids.clone(),
            acknowledged_at: acknowledgment.acknowledged_at,
            witness_hash: acknowledgment.witness_hash.clone(),
            rationale: acknowledgment.rationale.clone(),
            reference_petition_id: acknowledgment.reference_petition_id,
        };
        match event.payload() {
            Ok(payload) => {
                if let Err(err) = writer.write(event_types::PETITION_ACKNOWLEDGED, payload).await {
                    tracing::warn!(
                        petition_id = %acknowledgment.petition_id,
                        error = %err,
                        "acknowledgment event emission failed",
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    petition_id = %acknowledgment.petition_id,
                    error = %err,
                    "event payload build failed",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halt::SharedHaltGate;
    use crate::ports::{DeliberationSession, InMemorySessionDirectory};
    use fates_ledger::InMemoryEventLedger;
    use fates_store::{InMemoryAcknowledgmentRepository, InMemoryPetitionRepository};
    use fates_types::{EscalationSource, Petition, PetitionType, SessionId};

    struct Fixture {
        executor: AcknowledgmentExecutor,
        petitions: Arc<InMemoryPetitionRepository>,
        ledger: InMemoryEventLedger,
        sessions: Arc<InMemorySessionDirectory>,
        halt: Arc<SharedHaltGate>,
    }

    fn fixture_with_config(config: EngineConfig) -> Fixture {
        let petitions = Arc::new(InMemoryPetitionRepository::new());
        let acknowledgments = Arc::new(InMemoryAcknowledgmentRepository::new());
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        let sessions = Arc::new(InMemorySessionDirectory::new());
        let coordinator = FateCoordinator::new(
            petitions.clone(),
            Some(Arc::new(ledger.clone())),
            halt.clone(),
        );
        let executor = AcknowledgmentExecutor::new(
            acknowledgments,
            petitions.clone(),
            coordinator,
            Some(Arc::new(ledger.clone())),
            halt.clone(),
            config,
        )
        .with_session_directory(sessions.clone());
        Fixture {
            executor,
            petitions,
            ledger,
            sessions,
            halt,
        }
    }

    fn fixture() -> Fixture {
        // Dwell disabled by default; dwell-specific tests opt in.
        fixture_with_config(EngineConfig {
            min_dwell_seconds: 0,
            ..EngineConfig::default()
        })
    }

    async fn seed_petition(fx: &Fixture, state: PetitionState) -> PetitionId {
        let petition = Petition::new(
            PetitionId::new(),
            PetitionType::General,
            "Lower the toll on the east bridge",
            None,
            None,
            "governance",
            Utc::now(),
        )
        .unwrap();
        let id = petition.id;
        fx.petitions.save(&petition).await.unwrap();
        if state != PetitionState::Received {
            fx.petitions.update_state(id, state).await.unwrap();
        }
        id
    }

    async fn seed_escalated(fx: &Fixture, realm: &str) -> PetitionId {
        let id = seed_petition(fx, PetitionState::Received).await;
        fx.petitions
            .assign_fate_cas(
                id,
                PetitionState::Received,
                PetitionState::Escalated,
                None,
                Some(EscalationSource::CoSignerThreshold),
                Some(realm.to_string()),
            )
            .await
            .unwrap();
        id
    }

    fn long_rationale() -> String {
        "The realm has weighed this petition against current priorities and found the request \
         already covered by the standing infrastructure program."
            .to_string()
    }

    #[tokio::test]
    async fn test_marquis_acknowledge_happy_path() {
        let fx = fixture();
        let id = seed_petition(&fx, PetitionState::Deliberating).await;

        let ack = fx
            .executor
            .execute(id, ReasonCode::Noted, vec![ArchonId(15), ArchonId(42)], None, None)
            .await
            .unwrap();

        assert_eq!(ack.reason_code, ReasonCode::Noted);
        assert!(ack.witness_hash.starts_with("blake3:"));
        assert_eq!(
            fx.petitions.get(id).await.unwrap().unwrap().state,
            PetitionState::Acknowledged
        );
        assert_eq!(
            fx.ledger.events_of_type(event_types::PETITION_FATED).await.len(),
            1
        );
        assert_eq!(
            fx.ledger
                .events_of_type(event_types::PETITION_ACKNOWLEDGED)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_marquis_requires_two_archons() {
        let fx = fixture();
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        let err = fx
            .executor
            .execute(id, ReasonCode::Noted, vec![ArchonId(15)], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_double_execute_returns_same_acknowledgment() {
        let fx = fixture();
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        let archons = vec![ArchonId(1), ArchonId(2)];

        let first = fx
            .executor
            .execute(id, ReasonCode::Noted, archons.clone(), None, None)
            .await
            .unwrap();
        // The petition is ACKNOWLEDGED now, but re-delivery of the same
        // consensus must return the original record.
        let second = fx
            .executor
            .execute(id, ReasonCode::Noted, archons, None, None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_duplicate_requires_existing_reference() {
        let fx = fixture();
        let id = seed_petition(&fx, PetitionState::Deliberating).await;

        let err = fx
            .executor
            .execute(
                id,
                ReasonCode::Duplicate,
                vec![ArchonId(1), ArchonId(2)],
                None,
                Some(PetitionId::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::Validation { .. }));

        let reference = seed_petition(&fx, PetitionState::Received).await;
        assert!(fx
            .executor
            .execute(
                id,
                ReasonCode::Duplicate,
                vec![ArchonId(1), ArchonId(2)],
                None,
                Some(reference),
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_dwell_time_blocks_fresh_session() {
        let fx = fixture_with_config(EngineConfig::default());
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        fx.sessions
            .insert(DeliberationSession {
                session_id: SessionId::new(),
                petition_id: id,
                created_at: Utc::now(),
                participating_archons: vec![ArchonId(1), ArchonId(2), ArchonId(3)],
            })
            .await;

        let err = fx
            .executor
            .execute(id, ReasonCode::Noted, vec![ArchonId(1), ArchonId(2)], None, None)
            .await
            .unwrap_err();
        match err {
            FatesError::DwellTimeNotElapsed {
                remaining_seconds, ..
            } => assert!(remaining_seconds > 0 && remaining_seconds <= 30),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dwell_time_elapsed_session_passes() {
        let fx = fixture_with_config(EngineConfig::default());
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        fx.sessions
            .insert(DeliberationSession {
                session_id: SessionId::new(),
                petition_id: id,
                created_at: Utc::now() - chrono::Duration::seconds(31),
                participating_archons: vec![ArchonId(1), ArchonId(2), ArchonId(3)],
            })
            .await;

        assert!(fx
            .executor
            .execute(id, ReasonCode::Noted, vec![ArchonId(1), ArchonId(2)], None, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_system_code_skips_dwell_and_quorum() {
        let fx = fixture_with_config(EngineConfig::default());
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        // No session registered at all; a system acknowledgment does not care.
        let ack = fx
            .executor
            .execute_system_acknowledge(id, ReasonCode::KnightReferral, "Knight recommended closure".to_string())
            .await
            .unwrap();
        assert!(ack.acknowledging_archon_ids.is_empty());
    }

    #[tokio::test]
    async fn test_system_acknowledge_rejects_non_system_code() {
        let fx = fixture();
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        let err = fx
            .executor
            .execute_system_acknowledge(id, ReasonCode::Noted, "rationale".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_king_acknowledge_happy_path() {
        let fx = fixture();
        let id = seed_escalated(&fx, "governance").await;
        let king = KingId::new();

        let ack = fx
            .executor
            .execute_king_acknowledge(id, king, ReasonCode::Addressed, long_rationale(), "governance")
            .await
            .unwrap();

        assert_eq!(ack.acknowledged_by_king_id, Some(king));
        assert!(ack.acknowledging_archon_ids.is_empty());
        // Escalated petitions are terminal; the state does not move.
        assert_eq!(
            fx.petitions.get(id).await.unwrap().unwrap().state,
            PetitionState::Escalated
        );
        assert_eq!(
            fx.ledger
                .events_of_type(event_types::KING_ACKNOWLEDGED_ESCALATION)
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_king_rationale_length_boundary() {
        let fx = fixture();
        let id = seed_escalated(&fx, "governance").await;

        let err = fx
            .executor
            .execute_king_acknowledge(
                id,
                KingId::new(),
                ReasonCode::Addressed,
                "x".repeat(99),
                "governance",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::Validation { .. }));

        assert!(fx
            .executor
            .execute_king_acknowledge(
                id,
                KingId::new(),
                ReasonCode::Addressed,
                "x".repeat(100),
                "governance",
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_king_realm_mismatch() {
        let fx = fixture();
        let id = seed_escalated(&fx, "governance").await;

        let err = fx
            .executor
            .execute_king_acknowledge(
                id,
                KingId::new(),
                ReasonCode::Addressed,
                long_rationale(),
                "economy",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::RealmMismatch { .. }));
        assert_eq!(
            fx.petitions.get(id).await.unwrap().unwrap().state,
            PetitionState::Escalated
        );
    }

    #[tokio::test]
    async fn test_king_second_attempt_is_error() {
        let fx = fixture();
        let id = seed_escalated(&fx, "governance").await;

        fx.executor
            .execute_king_acknowledge(id, KingId::new(), ReasonCode::Addressed, long_rationale(), "governance")
            .await
            .unwrap();
        let err = fx
            .executor
            .execute_king_acknowledge(id, KingId::new(), ReasonCode::Addressed, long_rationale(), "governance")
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::AcknowledgmentAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_king_requires_escalated_state() {
        let fx = fixture();
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        let err = fx
            .executor
            .execute_king_acknowledge(id, KingId::new(), ReasonCode::Addressed, long_rationale(), "governance")
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::NotEscalated { .. }));
    }

    #[tokio::test]
    async fn test_halt_blocks_acknowledgment() {
        let fx = fixture();
        let id = seed_petition(&fx, PetitionState::Deliberating).await;
        fx.halt.halt("maintenance");
        let err = fx
            .executor
            .execute(id, ReasonCode::Noted, vec![ArchonId(1), ArchonId(2)], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::SystemHalted { .. }));
    }
}
