//! Referral execution and the deadline timeout handler
//!
//! A referral routes a deliberating petition to a Knight realm with a
//! durable deadline (default 3 cycles of 24h). The deadline job survives
//! restart; when it fires without a Knight response the referral expires
//! and the petition is auto-acknowledged with the EXPIRED reason.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use fates_crypto::{format_witness_hash, referral_witness_content, ContentHasher};
use fates_ledger::{event_types, EventWriter};
use fates_scheduler::{JobHandler, JobScheduler, ScheduledJob};
use fates_store::{PetitionRepository, ReferralRepository};
use fates_types::{
    FatesError, PetitionId, PetitionState, ReasonCode, Referral, ReferralId, ReferralStatus,
    Result, DEFAULT_DEADLINE_CYCLES,
};

use crate::acknowledgment::AcknowledgmentExecutor;
use crate::coordinator::FateCoordinator;
use crate::events::ReferralCreatedEvent;
use crate::halt::{ensure_not_halted, HaltGate};

/// Job type for referral deadline timers
pub const JOB_TYPE_REFERRAL_TIMEOUT: &str = "referral_timeout";

/// Payload carried by a referral timeout job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralTimeoutPayload {
    pub referral_id: ReferralId,
    pub petition_id: PetitionId,
    pub realm_id: String,
    pub deadline: chrono::DateTime<Utc>,
}

/// Executes petition referrals
#[derive(Clone)]
pub struct ReferralExecutor {
    referrals: Arc<dyn ReferralRepository>,
    petitions: Arc<dyn PetitionRepository>,
    coordinator: FateCoordinator,
    scheduler: Arc<dyn JobScheduler>,
    event_writer: Option<Arc<dyn EventWriter>>,
    halt_gate: Arc<dyn HaltGate>,
    hasher: ContentHasher,
}

impl ReferralExecutor {
    pub fn new(
        referrals: Arc<dyn ReferralRepository>,
        petitions: Arc<dyn PetitionRepository>,
        coordinator: FateCoordinator,
        scheduler: Arc<dyn JobScheduler>,
        event_writer: Option<Arc<dyn EventWriter>>,
        halt_gate: Arc<dyn HaltGate>,
    ) -> Self {
        Self {
            referrals,
            petitions,
            coordinator,
            scheduler,
            event_writer,
            halt_gate,
            hasher: ContentHasher::new(),
        }
    }

    /// Refer a deliberating petition to a Knight realm.
    pub async fn execute(
        &self,
        petition_id: PetitionId,
        realm_id: String,
        deadline_cycles: Option<u32>,
    ) -> Result<Referral> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        // Idempotency comes before state checks so a re-delivered REFER
        // consensus returns the original referral even after the state
        // moved to REFERRED.
        if let Some(existing) = self.referrals.get_by_petition(petition_id).await? {
            tracing::info!(
                petition_id = %petition_id,
                referral_id = %existing.id,
                "referral already exists, returning existing",
            );
            return Ok(existing);
        }

        let petition = self
            .petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })?;
        if petition.state.is_terminal() {
            return Err(FatesError::AlreadyFated {
                petition_id,
                terminal_state: petition.state,
            });
        }
        if petition.state != PetitionState::Deliberating {
            return Err(FatesError::validation(
                "state",
                format!(
                    "petition must be DELIBERATING to refer (currently {})",
                    petition.state
                ),
            ));
        }

        let cycles = deadline_cycles.unwrap_or(DEFAULT_DEADLINE_CYCLES);
        let created_at = Utc::now();
        let deadline = Referral::deadline_after(created_at, cycles);

        let referral_id = ReferralId::new();
        let witness_content =
            referral_witness_content(referral_id, petition_id, &realm_id, deadline, created_at);
        let witness_hash = format_witness_hash(&self.hasher.hash_text(&witness_content));

        let referral = Referral {
            id: referral_id,
            petition_id,
            realm_id: realm_id.clone(),
            deadline,
            created_at,
            status: ReferralStatus::Pending,
            witness_hash: witness_hash.clone(),
        };
        self.referrals.save(&referral).await?;

        self.coordinator
            .assign_fate_transactional(
                petition_id,
                PetitionState::Deliberating,
                PetitionState::Referred,
                "marquis",
                Some(format!("REFER to realm {realm_id}")),
            )
            .await?;

        // Durable deadline: the timer must outlive this process.
        let payload = ReferralTimeoutPayload {
            referral_id,
            petition_id,
            realm_id: realm_id.clone(),
            deadline,
        };
        let payload =
            serde_json::to_value(&payload).map_err(|e| FatesError::internal(e.to_string()))?;
        let job_id = self
            .scheduler
            .schedule(JOB_TYPE_REFERRAL_TIMEOUT, payload, deadline)
            .await?;
        tracing::info!(
            referral_id = %referral_id,
            job_id = %job_id,
            deadline = %deadline,
            "referral timeout scheduled",
        );

        if let Some(writer) = self.event_writer.as_ref() {
            let event = ReferralCreatedEvent {
                referral_id,
                petition_id,
                realm_id,
                deadline,
                created_at,
                witness_hash,
            };
            match event.payload() {
                Ok(payload) => {
                    if let Err(err) = writer.write(event_types::REFERRAL_CREATED, payload).await {
                        tracing::warn!(
                            referral_id = %referral_id,
                            error = %err,
                            "referral event emission failed",
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(referral_id = %referral_id, error = %err, "event payload build failed");
                }
            }
        }

        tracing::info!(
            petition_id = %petition_id,
            referral_id = %referral_id,
            deadline = %deadline,
            "referral execution completed",
        );
        Ok(referral)
    }

    /// Fetch a referral by id.
    pub async fn get_referral(&self, id: ReferralId) -> Result<Option<Referral>> {
        self.referrals.get(id).await
    }

    /// Fetch the referral for a petition.
    pub async fn get_referral_by_petition(
        &self,
        petition_id: PetitionId,
    ) -> Result<Option<Referral>> {
        self.referrals.get_by_petition(petition_id).await
    }
}

/// Handles `referral_timeout` jobs fired by the scheduler.
///
/// Idempotent under re-delivery: a RESOLVED referral is a no-op, an
/// already-EXPIRED referral only re-attempts the (itself idempotent)
/// system acknowledgment.
pub struct ReferralTimeoutHandler {
    referrals: Arc<dyn ReferralRepository>,
    acknowledgments: AcknowledgmentExecutor,
}

impl ReferralTimeoutHandler {
    pub fn new(referrals: Arc<dyn ReferralRepository>, acknowledgments: AcknowledgmentExecutor) -> Self {
        Self {
            referrals,
            acknowledgments,
        }
    }

    async fn expire_and_acknowledge(&self, payload: ReferralTimeoutPayload) -> Result<()> {
        let Some(referral) = self.referrals.get(payload.referral_id).await? else {
            tracing::warn!(referral_id = %payload.referral_id, "timeout fired for unknown referral");
            return Ok(());
        };

        match referral.status {
            ReferralStatus::Resolved => {
                tracing::debug!(
                    referral_id = %referral.id,
                    "referral resolved before deadline, timeout is a no-op",
                );
                return Ok(());
            }
            ReferralStatus::Pending => {
                if self.referrals.expire_if_pending(referral.id).await?.is_none() {
                    // Raced with resolution; nothing more to do.
                    return Ok(());
                }
                tracing::info!(referral_id = %referral.id, "referral deadline passed, marked expired");
            }
            ReferralStatus::Expired => {
                // Re-delivery after a partial failure; fall through to the
                // acknowledgment, which is idempotent.
            }
        }

        let rationale = format!(
            "Referral {} to realm {} expired at {} with no Knight response",
            referral.id, referral.realm_id, referral.deadline
        );
        self.acknowledgments
            .execute_system_acknowledge(payload.petition_id, ReasonCode::Expired, rationale)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobHandler for ReferralTimeoutHandler {
    async fn handle(&self, job: &ScheduledJob) -> Result<()> {
        let payload: ReferralTimeoutPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| {
                FatesError::internal(format!("malformed referral timeout payload: {e}"))
            })?;
        self.expire_and_acknowledge(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::halt::SharedHaltGate;
    use fates_ledger::InMemoryEventLedger;
    use fates_scheduler::{InMemoryJobStore, JobStore, StoreScheduler};
    use fates_store::{
        AcknowledgmentRepository, InMemoryAcknowledgmentRepository, InMemoryPetitionRepository,
        InMemoryReferralRepository,
    };
    use fates_types::{Petition, PetitionType};

    struct Fixture {
        executor: ReferralExecutor,
        handler: ReferralTimeoutHandler,
        petitions: Arc<InMemoryPetitionRepository>,
        referrals: Arc<InMemoryReferralRepository>,
        acknowledgments: Arc<InMemoryAcknowledgmentRepository>,
        job_store: Arc<InMemoryJobStore>,
        ledger: InMemoryEventLedger,
    }

    fn fixture() -> Fixture {
        let petitions = Arc::new(InMemoryPetitionRepository::new());
        let referrals = Arc::new(InMemoryReferralRepository::new());
        let acknowledgments = Arc::new(InMemoryAcknowledgmentRepository::new());
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        let job_store = Arc::new(InMemoryJobStore::new());
        let scheduler = Arc::new(StoreScheduler::new(job_store.clone()));
        let coordinator = FateCoordinator::new(
            petitions.clone(),
            Some(Arc::new(ledger.clone())),
            halt.clone(),
        );
        let ack_executor = AcknowledgmentExecutor::new(
            acknowledgments.clone(),
            petitions.clone(),
            coordinator.clone(),
            Some(Arc::new(ledger.clone())),
            halt.clone(),
            EngineConfig {
                min_dwell_seconds: 0,
                ..EngineConfig::default()
            },
        );
        let executor = ReferralExecutor::new(
            referrals.clone(),
            petitions.clone(),
            coordinator,
            scheduler,
            Some(Arc::new(ledger.clone())),
            halt,
        );
        let handler = ReferralTimeoutHandler::new(referrals.clone(), ack_executor);
        Fixture {
            executor,
            handler,
            petitions,
            referrals,
            acknowledgments,
            job_store,
            ledger,
        }
    }

    async fn seed_deliberating(fx: &Fixture) -> PetitionId {
        let petition = Petition::new(
            PetitionId::new(),
            PetitionType::Grievance,
            "The mill fees doubled without notice",
            None,
            None,
            "governance",
            Utc::now(),
        )
        .unwrap();
        let id = petition.id;
        fx.petitions.save(&petition).await.unwrap();
        fx.petitions
            .update_state(id, PetitionState::Deliberating)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_execute_happy_path() {
        let fx = fixture();
        let id = seed_deliberating(&fx).await;

        let referral = fx
            .executor
            .execute(id, "governance".to_string(), None)
            .await
            .unwrap();

        assert_eq!(referral.status, ReferralStatus::Pending);
        assert_eq!(
            referral.deadline - referral.created_at,
            chrono::Duration::hours(72)
        );
        assert_eq!(
            fx.petitions.get(id).await.unwrap().unwrap().state,
            PetitionState::Referred
        );
        assert_eq!(
            fx.ledger.events_of_type(event_types::REFERRAL_CREATED).await.len(),
            1
        );

        // The deadline job is durable before execute returns.
        let due = fx
            .job_store
            .due(referral.deadline, 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].job_type, JOB_TYPE_REFERRAL_TIMEOUT);
    }

    #[tokio::test]
    async fn test_execute_is_idempotent() {
        let fx = fixture();
        let id = seed_deliberating(&fx).await;

        let first = fx
            .executor
            .execute(id, "governance".to_string(), None)
            .await
            .unwrap();
        // Petition is REFERRED now; a re-delivered consensus still returns
        // the original referral.
        let second = fx
            .executor
            .execute(id, "governance".to_string(), None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_execute_requires_deliberating() {
        let fx = fixture();
        let petition = Petition::new(
            PetitionId::new(),
            PetitionType::General,
            "text",
            None,
            None,
            "default",
            Utc::now(),
        )
        .unwrap();
        let id = petition.id;
        fx.petitions.save(&petition).await.unwrap();

        let err = fx
            .executor
            .execute(id, "governance".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_timeout_expires_and_acknowledges() {
        let fx = fixture();
        let id = seed_deliberating(&fx).await;
        let referral = fx
            .executor
            .execute(id, "governance".to_string(), Some(1))
            .await
            .unwrap();

        let job = ScheduledJob::new(
            JOB_TYPE_REFERRAL_TIMEOUT,
            serde_json::to_value(ReferralTimeoutPayload {
                referral_id: referral.id,
                petition_id: id,
                realm_id: "governance".to_string(),
                deadline: referral.deadline,
            })
            .unwrap(),
            referral.deadline,
        );
        fx.handler.handle(&job).await.unwrap();

        assert_eq!(
            fx.referrals.get(referral.id).await.unwrap().unwrap().status,
            ReferralStatus::Expired
        );
        let ack = fx
            .acknowledgments
            .get_by_petition(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ack.reason_code, ReasonCode::Expired);
        assert_eq!(
            fx.petitions.get(id).await.unwrap().unwrap().state,
            PetitionState::Acknowledged
        );
    }

    #[tokio::test]
    async fn test_double_fire_produces_one_acknowledgment() {
        let fx = fixture();
        let id = seed_deliberating(&fx).await;
        let referral = fx
            .executor
            .execute(id, "governance".to_string(), Some(1))
            .await
            .unwrap();

        let job = ScheduledJob::new(
            JOB_TYPE_REFERRAL_TIMEOUT,
            serde_json::to_value(ReferralTimeoutPayload {
                referral_id: referral.id,
                petition_id: id,
                realm_id: "governance".to_string(),
                deadline: referral.deadline,
            })
            .unwrap(),
            referral.deadline,
        );
        fx.handler.handle(&job).await.unwrap();
        fx.handler.handle(&job).await.unwrap();

        let ack = fx
            .acknowledgments
            .get_by_petition(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ack.reason_code, ReasonCode::Expired);
    }

    #[tokio::test]
    async fn test_resolved_referral_is_noop() {
        let fx = fixture();
        let id = seed_deliberating(&fx).await;
        let referral = fx
            .executor
            .execute(id, "governance".to_string(), Some(1))
            .await
            .unwrap();
        fx.referrals.mark_resolved(referral.id).await.unwrap();

        let job = ScheduledJob::new(
            JOB_TYPE_REFERRAL_TIMEOUT,
            serde_json::to_value(ReferralTimeoutPayload {
                referral_id: referral.id,
                petition_id: id,
                realm_id: "governance".to_string(),
                deadline: referral.deadline,
            })
            .unwrap(),
            referral.deadline,
        );
        fx.handler.handle(&job).await.unwrap();

        assert!(fx
            .acknowledgments
            .get_by_petition(id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            fx.petitions.get(id).await.unwrap().unwrap().state,
            PetitionState::Referred
        );
    }
}
