//! Transactional fate coordinator
//!
//! The only component permitted to move a petition into a terminal state.
//! The pattern is CAS -> emit -> commit or rollback:
//!
//! 1. Halt check first
//! 2. `assign_fate_cas`; CAS failures propagate unchanged, state never moved
//! 3. Emit the fate event; on success the operation is committed
//! 4. On emission failure, roll the state back to the pre-CAS value and
//!    surface `FateEventEmissionFailed` with the cause chained
//!
//! A missing event writer is a configuration error and is treated as an
//! emission failure: the state is rolled back, never left fated without
//! a witnessed event.

use std::sync::Arc;

use fates_ledger::{event_types, EventWriter};
use fates_store::PetitionRepository;
use fates_types::{
    EscalationSource, FatesError, Petition, PetitionId, PetitionState, Result, StatusToken,
};

use crate::events::PetitionFatedEvent;
use crate::halt::{ensure_not_halted, HaltGate};
use crate::ports::FateNotifier;

/// Pairs the CAS state change with a witnessed fate event
#[derive(Clone)]
pub struct FateCoordinator {
    petitions: Arc<dyn PetitionRepository>,
    event_writer: Option<Arc<dyn EventWriter>>,
    halt_gate: Arc<dyn HaltGate>,
    fate_notifier: Option<Arc<dyn FateNotifier>>,
}

impl FateCoordinator {
    pub fn new(
        petitions: Arc<dyn PetitionRepository>,
        event_writer: Option<Arc<dyn EventWriter>>,
        halt_gate: Arc<dyn HaltGate>,
    ) -> Self {
        Self {
            petitions,
            event_writer,
            halt_gate,
            fate_notifier: None,
        }
    }

    pub fn with_fate_notifier(mut self, notifier: Arc<dyn FateNotifier>) -> Self {
        self.fate_notifier = Some(notifier);
        self
    }

    /// Assign a fate with transactional event emission.
    pub async fn assign_fate_transactional(
        &self,
        petition_id: PetitionId,
        expected: PetitionState,
        new: PetitionState,
        actor: &str,
        reason: Option<String>,
    ) -> Result<Petition> {
        self.assign_fate_inner(petition_id, expected, new, actor, reason, None)
            .await
    }

    /// Assign the ESCALATED fate, populating the escalation triple in the
    /// same atomic CAS.
    pub async fn assign_escalation_transactional(
        &self,
        petition_id: PetitionId,
        expected: PetitionState,
        escalation_source: EscalationSource,
        escalated_to_realm: String,
        actor: &str,
        reason: Option<String>,
    ) -> Result<Petition> {
        self.assign_fate_inner(
            petition_id,
            expected,
            PetitionState::Escalated,
            actor,
            reason,
            Some((escalation_source, escalated_to_realm)),
        )
        .await
    }

    /// Resolve a REFERRED petition to ACKNOWLEDGED on behalf of the
    /// referral workflow (expiry or Knight recommendation).
    ///
    /// REFERRED sits outside the live transition matrix, so the CAS
    /// cannot express this move; the referral workflow is the single
    /// writer for REFERRED petitions, and the acknowledgment unique
    /// constraint backstops duplicate resolution. Event pairing and
    /// rollback behave exactly like the CAS path.
    pub async fn resolve_referred_petition(
        &self,
        petition_id: PetitionId,
        actor: &str,
        reason: Option<String>,
    ) -> Result<Petition> {
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        let petition = self
            .petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })?;
        if petition.state != PetitionState::Referred {
            return Err(FatesError::ConcurrentModification {
                petition_id,
                expected: PetitionState::Referred,
                actual: petition.state,
            });
        }

        self.petitions
            .update_state(petition_id, PetitionState::Acknowledged)
            .await?;

        let Some(writer) = self.event_writer.as_ref() else {
            self.rollback(petition_id, PetitionState::Referred).await;
            return Err(FatesError::FateEventEmissionFailed {
                petition_id,
                rolled_back_to: PetitionState::Referred,
                source: Box::new(FatesError::configuration(
                    "event writer not configured; fate assignment refused",
                )),
            });
        };
        let event = PetitionFatedEvent {
            petition_id,
            previous_state: PetitionState::Referred,
            new_state: PetitionState::Acknowledged,
            actor: actor.to_string(),
            reason: reason.clone(),
        };
        if let Err(emission_err) = writer.write(event_types::PETITION_FATED, event.payload()?).await
        {
            self.rollback(petition_id, PetitionState::Referred).await;
            return Err(FatesError::FateEventEmissionFailed {
                petition_id,
                rolled_back_to: PetitionState::Referred,
                source: Box::new(emission_err),
            });
        }

        tracing::info!(petition_id = %petition_id, actor, "referred petition resolved to acknowledged");
        self.petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })
    }

    async fn assign_fate_inner(
        &self,
        petition_id: PetitionId,
        expected: PetitionState,
        new: PetitionState,
        actor: &str,
        reason: Option<String>,
        escalation: Option<(EscalationSource, String)>,
    ) -> Result<Petition> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        tracing::info!(
            petition_id = %petition_id,
            expected = %expected,
            new = %new,
            actor,
            "fate assignment started",
        );

        // Step 1: CAS state update. A failure here propagates unchanged;
        // the state never moved, so there is nothing to roll back.
        let (escalation_source, escalated_to_realm) = match escalation {
            Some((source, realm)) => (Some(source), Some(realm)),
            None => (None, None),
        };
        let updated = self
            .petitions
            .assign_fate_cas(
                petition_id,
                expected,
                new,
                reason.clone(),
                escalation_source,
                escalated_to_realm,
            )
            .await?;

        // Step 2: emit the fate event, or roll back.
        let Some(writer) = self.event_writer.as_ref() else {
            tracing::error!(petition_id = %petition_id, "no event writer configured");
            self.rollback(petition_id, expected).await;
            return Err(FatesError::FateEventEmissionFailed {
                petition_id,
                rolled_back_to: expected,
                source: Box::new(FatesError::configuration(
                    "event writer not configured; fate assignment refused",
                )),
            });
        };

        let event = PetitionFatedEvent {
            petition_id,
            previous_state: expected,
            new_state: new,
            actor: actor.to_string(),
            reason: reason.clone(),
        };
        if let Err(emission_err) = writer.write(event_types::PETITION_FATED, event.payload()?).await
        {
            tracing::error!(
                petition_id = %petition_id,
                error = %emission_err,
                "fate event emission failed, rolling back",
            );
            self.rollback(petition_id, expected).await;
            return Err(FatesError::FateEventEmissionFailed {
                petition_id,
                rolled_back_to: expected,
                source: Box::new(emission_err),
            });
        }

        tracing::info!(
            petition_id = %petition_id,
            fate = %new,
            actor,
            "fate assignment committed",
        );

        // Step 3: post-commit side effects, fire-and-forget.
        if let Some(notifier) = self.fate_notifier.as_ref() {
            let token = StatusToken::compute(updated.content_hash.as_ref(), new);
            if let Err(err) = notifier
                .notify_fate_assigned(petition_id, new, reason.as_deref(), token)
                .await
            {
                tracing::warn!(
                    petition_id = %petition_id,
                    error = %err,
                    "fate notification failed",
                );
            }
        }

        Ok(updated)
    }

    /// Roll the petition back to its pre-CAS state. Failure here is logged
    /// loudly: it means a fated row without an event until an operator or
    /// recovery pass intervenes.
    async fn rollback(&self, petition_id: PetitionId, previous: PetitionState) {
        match self.petitions.update_state(petition_id, previous).await {
            Ok(()) => {
                tracing::warn!(
                    petition_id = %petition_id,
                    rolled_back_to = %previous,
                    "fate state rolled back",
                );
            }
            Err(err) => {
                tracing::error!(
                    petition_id = %petition_id,
                    error = %err,
                    "CRITICAL: rollback failed, petition may be fated without an event",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halt::SharedHaltGate;
    use chrono::Utc;
    use fates_ledger::{FailingEventWriter, InMemoryEventLedger};
    use fates_store::InMemoryPetitionRepository;
    use fates_types::{Petition, PetitionType};

    async fn seeded(
        state: PetitionState,
    ) -> (Arc<InMemoryPetitionRepository>, PetitionId) {
        let repo = Arc::new(InMemoryPetitionRepository::new());
        let petition = Petition::new(
            PetitionId::new(),
            PetitionType::General,
            "Reopen the northern granary",
            None,
            None,
            "default",
            Utc::now(),
        )
        .unwrap();
        let id = petition.id;
        repo.save(&petition).await.unwrap();
        if state != PetitionState::Received {
            repo.update_state(id, state).await.unwrap();
        }
        (repo, id)
    }

    #[tokio::test]
    async fn test_commit_pairs_state_and_event() {
        let (repo, id) = seeded(PetitionState::Deliberating).await;
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        let coordinator =
            FateCoordinator::new(repo.clone(), Some(Arc::new(ledger.clone())), halt);

        let updated = coordinator
            .assign_fate_transactional(
                id,
                PetitionState::Deliberating,
                PetitionState::Acknowledged,
                "marquis",
                Some("NOTED".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(updated.state, PetitionState::Acknowledged);
        let events = ledger.events_of_type(event_types::PETITION_FATED).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["new_state"], "ACKNOWLEDGED");
        assert!(events[0].verify_witness());
    }

    #[tokio::test]
    async fn test_emission_failure_rolls_back() {
        let (repo, id) = seeded(PetitionState::Received).await;
        let inner = InMemoryEventLedger::new();
        let failing = FailingEventWriter::new(inner.clone(), 1);
        let halt = Arc::new(SharedHaltGate::new());
        let coordinator = FateCoordinator::new(repo.clone(), Some(Arc::new(failing)), halt);

        let err = coordinator
            .assign_fate_transactional(
                id,
                PetitionState::Received,
                PetitionState::Acknowledged,
                "submitter",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FatesError::FateEventEmissionFailed { .. }));
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().state,
            PetitionState::Received
        );
        assert!(inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_writer_is_emission_failure() {
        let (repo, id) = seeded(PetitionState::Deliberating).await;
        let halt = Arc::new(SharedHaltGate::new());
        let coordinator = FateCoordinator::new(repo.clone(), None, halt);

        let err = coordinator
            .assign_fate_transactional(
                id,
                PetitionState::Deliberating,
                PetitionState::Deferred,
                "marquis",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FatesError::FateEventEmissionFailed { .. }));
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().state,
            PetitionState::Deliberating
        );
    }

    #[tokio::test]
    async fn test_cas_failure_propagates_without_rollback() {
        let (repo, id) = seeded(PetitionState::Deliberating).await;
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        let coordinator =
            FateCoordinator::new(repo.clone(), Some(Arc::new(ledger.clone())), halt);

        let err = coordinator
            .assign_fate_transactional(
                id,
                PetitionState::Received,
                PetitionState::Acknowledged,
                "marquis",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FatesError::ConcurrentModification { .. }));
        assert!(ledger.is_empty().await);
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().state,
            PetitionState::Deliberating
        );
    }

    #[tokio::test]
    async fn test_halt_refuses_before_any_state_change() {
        let (repo, id) = seeded(PetitionState::Deliberating).await;
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        halt.halt("constitutional review");
        let coordinator =
            FateCoordinator::new(repo.clone(), Some(Arc::new(ledger.clone())), halt);

        let err = coordinator
            .assign_fate_transactional(
                id,
                PetitionState::Deliberating,
                PetitionState::Acknowledged,
                "marquis",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FatesError::SystemHalted { .. }));
        assert_eq!(
            repo.get(id).await.unwrap().unwrap().state,
            PetitionState::Deliberating
        );
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_post_commit_notification_fires() {
        use tokio::sync::Mutex;

        #[derive(Default)]
        struct RecordingNotifier {
            notified: Mutex<Vec<(PetitionId, PetitionState, StatusToken)>>,
        }

        #[async_trait::async_trait]
        impl crate::ports::FateNotifier for RecordingNotifier {
            async fn notify_fate_assigned(
                &self,
                petition_id: PetitionId,
                fate: PetitionState,
                _fate_reason: Option<&str>,
                status_token: StatusToken,
            ) -> Result<()> {
                self.notified
                    .lock()
                    .await
                    .push((petition_id, fate, status_token));
                Ok(())
            }
        }

        let (repo, id) = seeded(PetitionState::Deliberating).await;
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = FateCoordinator::new(repo.clone(), Some(Arc::new(ledger)), halt)
            .with_fate_notifier(notifier.clone());

        coordinator
            .assign_fate_transactional(
                id,
                PetitionState::Deliberating,
                PetitionState::NoResponse,
                "marquis",
                None,
            )
            .await
            .unwrap();

        let notified = notifier.notified.lock().await;
        assert_eq!(notified.len(), 1);
        assert_eq!(notified[0].0, id);
        assert_eq!(notified[0].1, PetitionState::NoResponse);
    }

    #[tokio::test]
    async fn test_escalation_triple_populated_through_coordinator() {
        let (repo, id) = seeded(PetitionState::Received).await;
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        let coordinator = FateCoordinator::new(repo.clone(), Some(Arc::new(ledger)), halt);

        let updated = coordinator
            .assign_escalation_transactional(
                id,
                PetitionState::Received,
                EscalationSource::CoSignerThreshold,
                "governance".to_string(),
                "threshold-detector",
                None,
            )
            .await
            .unwrap();

        assert_eq!(updated.state, PetitionState::Escalated);
        assert_eq!(
            updated.escalation_source,
            Some(EscalationSource::CoSignerThreshold)
        );
        assert_eq!(updated.escalated_to_realm.as_deref(), Some("governance"));
    }
}
