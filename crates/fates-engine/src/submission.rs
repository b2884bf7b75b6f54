//! Petition submission and withdrawal
//!
//! Submission is durable before the `petition.received` event is emitted;
//! an emission failure is logged, never surfaced. Withdrawal is a fate
//! assignment and flows through the coordinator with the WITHDRAWN reason.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};

use fates_crypto::ContentHasher;
use fates_ledger::{event_types, EventWriter};
use fates_store::{NotificationPreferenceRepository, PetitionRepository};
use fates_types::{
    FatesError, NotificationPreference, Petition, PetitionId, PetitionState, PetitionType,
    ReasonCode, Result, SubmitterId,
};

use crate::coordinator::FateCoordinator;
use crate::events::{PetitionReceivedEvent, PetitionWithdrawnEvent};
use crate::halt::{ensure_not_halted, HaltGate};
use crate::ports::RealmRegistry;

/// Notification preference named at submission time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationRequest {
    Webhook { url: String },
    InApp,
}

/// A petition submission request
#[derive(Debug, Clone)]
pub struct SubmitPetitionRequest {
    pub petition_type: PetitionType,
    pub text: String,
    pub realm: Option<String>,
    pub submitter_id: Option<SubmitterId>,
    pub notification: Option<NotificationRequest>,
}

/// Result of a successful submission
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub petition_id: PetitionId,
    pub state: PetitionState,
    pub petition_type: PetitionType,
    /// Base64-encoded blake3 digest of the text
    pub content_hash: String,
    pub realm: String,
    pub created_at: DateTime<Utc>,
}

/// Accepts petitions into the system and handles submitter withdrawal
#[derive(Clone)]
pub struct SubmissionService {
    petitions: Arc<dyn PetitionRepository>,
    hasher: ContentHasher,
    realm_registry: Arc<dyn RealmRegistry>,
    halt_gate: Arc<dyn HaltGate>,
    coordinator: FateCoordinator,
    event_writer: Option<Arc<dyn EventWriter>>,
    notification_prefs: Option<Arc<dyn NotificationPreferenceRepository>>,
}

impl SubmissionService {
    pub fn new(
        petitions: Arc<dyn PetitionRepository>,
        realm_registry: Arc<dyn RealmRegistry>,
        halt_gate: Arc<dyn HaltGate>,
        coordinator: FateCoordinator,
        event_writer: Option<Arc<dyn EventWriter>>,
    ) -> Self {
        Self {
            petitions,
            hasher: ContentHasher::new(),
            realm_registry,
            halt_gate,
            coordinator,
            event_writer,
            notification_prefs: None,
        }
    }

    pub fn with_notification_prefs(
        mut self,
        prefs: Arc<dyn NotificationPreferenceRepository>,
    ) -> Self {
        self.notification_prefs = Some(prefs);
        self
    }

    /// Submit a new petition. Returns once the petition is durable in
    /// RECEIVED state.
    pub async fn submit_petition(&self, request: SubmitPetitionRequest) -> Result<SubmissionResult> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        tracing::info!(
            petition_type = %request.petition_type,
            text_length = request.text.chars().count(),
            realm = ?request.realm,
            "submission started",
        );

        // Resolve realm against the registry.
        let realm = self.resolve_realm(request.realm.as_deref()).await?;

        // Content hash over the UTF-8 text.
        let content_hash = self.hasher.hash_text(&request.text);
        let content_hash_b64 = BASE64.encode(content_hash);

        let petition_id = PetitionId::new();
        let created_at = Utc::now();
        let petition = Petition::new(
            petition_id,
            request.petition_type,
            request.text,
            request.submitter_id,
            Some(content_hash),
            realm.clone(),
            created_at,
        )?;

        self.petitions.save(&petition).await?;
        tracing::info!(
            petition_id = %petition_id,
            realm = %realm,
            state = %PetitionState::Received,
            "submission completed",
        );

        // Notification preference is best-effort; a failure is logged and
        // the submission stands.
        if let (Some(prefs), Some(notification)) =
            (self.notification_prefs.as_ref(), request.notification)
        {
            let preference = match notification {
                NotificationRequest::Webhook { url } => {
                    NotificationPreference::webhook(petition_id, url, true)
                }
                NotificationRequest::InApp => NotificationPreference::in_app(petition_id, true),
            };
            if let Err(err) = prefs.save(&preference).await {
                tracing::warn!(
                    petition_id = %petition_id,
                    error = %err,
                    "notification preference storage failed",
                );
            }
        }

        // petition.received is best-effort: the petition is already
        // durable, the event is for observability.
        if let Some(writer) = self.event_writer.as_ref() {
            let event = PetitionReceivedEvent {
                petition_id,
                petition_type: request.petition_type,
                realm: realm.clone(),
                content_hash: content_hash_b64.clone(),
                submitter_id: request.submitter_id,
                received_at: created_at,
            };
            match event.payload() {
                Ok(payload) => {
                    if let Err(err) = writer.write(event_types::PETITION_RECEIVED, payload).await {
                        tracing::warn!(
                            petition_id = %petition_id,
                            error = %err,
                            "petition.received emission failed",
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(petition_id = %petition_id, error = %err, "event payload build failed");
                }
            }
        }

        Ok(SubmissionResult {
            petition_id,
            state: PetitionState::Received,
            petition_type: request.petition_type,
            content_hash: content_hash_b64,
            realm,
            created_at,
        })
    }

    /// Fetch a petition. Reads bypass the halt gate.
    pub async fn get_petition(&self, petition_id: PetitionId) -> Result<Option<Petition>> {
        self.petitions.get(petition_id).await
    }

    /// Withdraw a petition before fate assignment.
    ///
    /// Only the original submitter may withdraw; anonymous petitions are
    /// ineligible. The petition transitions to ACKNOWLEDGED with the
    /// WITHDRAWN reason.
    pub async fn withdraw_petition(
        &self,
        petition_id: PetitionId,
        requester_id: SubmitterId,
        reason: Option<String>,
    ) -> Result<Petition> {
        // HALT CHECK FIRST
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        let petition = self
            .petitions
            .get(petition_id)
            .await?
            .ok_or(FatesError::PetitionNotFound { petition_id })?;

        let Some(submitter_id) = petition.submitter_id else {
            tracing::warn!(petition_id = %petition_id, "withdrawal rejected: anonymous petition");
            return Err(FatesError::unauthorized(
                "anonymous petitions cannot be withdrawn",
            ));
        };
        if submitter_id != requester_id {
            tracing::warn!(
                petition_id = %petition_id,
                requester_id = %requester_id,
                "withdrawal rejected: requester is not the submitter",
            );
            return Err(FatesError::unauthorized(
                "only the original submitter may withdraw a petition",
            ));
        }
        if petition.state.is_terminal() {
            return Err(FatesError::AlreadyFated {
                petition_id,
                terminal_state: petition.state,
            });
        }

        let rationale = reason.clone().unwrap_or_else(|| "Petitioner withdrew".to_string());
        let updated = self
            .coordinator
            .assign_fate_transactional(
                petition_id,
                petition.state,
                PetitionState::Acknowledged,
                &format!("submitter:{requester_id}"),
                Some(format!("{}: {rationale}", ReasonCode::Withdrawn)),
            )
            .await?;

        tracing::info!(
            petition_id = %petition_id,
            previous_state = %petition.state,
            "withdrawal completed",
        );

        // The withdrawal event is secondary; the fate event already
        // committed, so a failure here is logged and swallowed.
        if let Some(writer) = self.event_writer.as_ref() {
            let event = PetitionWithdrawnEvent {
                petition_id,
                withdrawn_by: requester_id,
                reason,
                withdrawn_at: Utc::now(),
            };
            match event.payload() {
                Ok(payload) => {
                    if let Err(err) = writer.write(event_types::PETITION_WITHDRAWN, payload).await {
                        tracing::warn!(
                            petition_id = %petition_id,
                            error = %err,
                            "petition.withdrawn emission failed",
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(petition_id = %petition_id, error = %err, "event payload build failed");
                }
            }
        }

        Ok(updated)
    }

    async fn resolve_realm(&self, realm: Option<&str>) -> Result<String> {
        match realm {
            None => Ok(self.realm_registry.default_realm().await),
            Some(realm) => {
                if self.realm_registry.contains(realm).await {
                    Ok(realm.to_string())
                } else {
                    Err(FatesError::validation(
                        "realm",
                        format!("unknown realm: {realm}"),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halt::SharedHaltGate;
    use crate::ports::StaticRealmRegistry;
    use fates_ledger::InMemoryEventLedger;
    use fates_store::{InMemoryNotificationPreferenceRepository, InMemoryPetitionRepository};

    struct Fixture {
        service: SubmissionService,
        petitions: Arc<InMemoryPetitionRepository>,
        ledger: InMemoryEventLedger,
        halt: Arc<SharedHaltGate>,
        prefs: Arc<InMemoryNotificationPreferenceRepository>,
    }

    fn fixture() -> Fixture {
        let petitions = Arc::new(InMemoryPetitionRepository::new());
        let ledger = InMemoryEventLedger::new();
        let halt = Arc::new(SharedHaltGate::new());
        let prefs = Arc::new(InMemoryNotificationPreferenceRepository::new());
        let coordinator = FateCoordinator::new(
            petitions.clone(),
            Some(Arc::new(ledger.clone())),
            halt.clone(),
        );
        let service = SubmissionService::new(
            petitions.clone(),
            Arc::new(StaticRealmRegistry::default()),
            halt.clone(),
            coordinator,
            Some(Arc::new(ledger.clone())),
        )
        .with_notification_prefs(prefs.clone());
        Fixture {
            service,
            petitions,
            ledger,
            halt,
            prefs,
        }
    }

    fn request(text: &str) -> SubmitPetitionRequest {
        SubmitPetitionRequest {
            petition_type: PetitionType::General,
            text: text.to_string(),
            realm: None,
            submitter_id: None,
            notification: None,
        }
    }

    #[tokio::test]
    async fn test_submit_happy_path() {
        let fx = fixture();
        let result = fx
            .service
            .submit_petition(request("Reopen the northern granary"))
            .await
            .unwrap();

        assert_eq!(result.state, PetitionState::Received);
        assert_eq!(result.realm, "default");

        let stored = fx.petitions.get(result.petition_id).await.unwrap().unwrap();
        assert_eq!(stored.state, PetitionState::Received);
        let expected_hash = ContentHasher::new().hash_text("Reopen the northern granary");
        assert_eq!(stored.content_hash, Some(expected_hash));
        assert_eq!(result.content_hash, BASE64.encode(expected_hash));

        let events = fx.ledger.events_of_type(event_types::PETITION_RECEIVED).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_realm() {
        let fx = fixture();
        let mut req = request("text");
        req.realm = Some("atlantis".to_string());
        let err = fx.service.submit_petition(req).await.unwrap_err();
        assert!(matches!(err, FatesError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_submit_named_realm_is_kept() {
        let fx = fixture();
        let mut req = request("text");
        req.realm = Some("governance".to_string());
        let result = fx.service.submit_petition(req).await.unwrap();
        assert_eq!(result.realm, "governance");
    }

    #[tokio::test]
    async fn test_submit_rejects_during_halt() {
        let fx = fixture();
        fx.halt.halt("maintenance");
        let err = fx.service.submit_petition(request("text")).await.unwrap_err();
        assert!(matches!(err, FatesError::SystemHalted { .. }));
    }

    #[tokio::test]
    async fn test_submit_text_bounds() {
        let fx = fixture();
        assert!(fx
            .service
            .submit_petition(request(&"x".repeat(10_000)))
            .await
            .is_ok());
        assert!(fx
            .service
            .submit_petition(request(&"x".repeat(10_001)))
            .await
            .is_err());
        assert!(fx.service.submit_petition(request("")).await.is_err());
    }

    #[tokio::test]
    async fn test_notification_preference_stored() {
        let fx = fixture();
        let mut req = request("text");
        req.notification = Some(NotificationRequest::Webhook {
            url: "https://observer.example/hook".to_string(),
        });
        let result = fx.service.submit_petition(req).await.unwrap();
        assert!(fx
            .prefs
            .get_by_petition(result.petition_id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_withdraw_authorization_ladder() {
        let fx = fixture();
        let submitter = SubmitterId::new();

        // Unknown petition
        let err = fx
            .service
            .withdraw_petition(PetitionId::new(), submitter, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::PetitionNotFound { .. }));

        // Anonymous petition
        let anonymous = fx.service.submit_petition(request("anon text")).await.unwrap();
        let err = fx
            .service
            .withdraw_petition(anonymous.petition_id, submitter, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::Unauthorized { .. }));

        // Wrong requester
        let mut req = request("signed text");
        req.submitter_id = Some(submitter);
        let owned = fx.service.submit_petition(req).await.unwrap();
        let err = fx
            .service
            .withdraw_petition(owned.petition_id, SubmitterId::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::Unauthorized { .. }));

        // Rightful submitter succeeds
        let updated = fx
            .service
            .withdraw_petition(owned.petition_id, submitter, Some("changed my mind".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.state, PetitionState::Acknowledged);
        assert!(updated
            .fate_reason
            .as_deref()
            .unwrap()
            .starts_with("WITHDRAWN"));

        // Already fated on second attempt
        let err = fx
            .service
            .withdraw_petition(owned.petition_id, submitter, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FatesError::AlreadyFated { .. }));
    }

    #[tokio::test]
    async fn test_withdraw_emits_fate_and_withdrawn_events() {
        let fx = fixture();
        let submitter = SubmitterId::new();
        let mut req = request("signed text");
        req.submitter_id = Some(submitter);
        let result = fx.service.submit_petition(req).await.unwrap();

        fx.service
            .withdraw_petition(result.petition_id, submitter, None)
            .await
            .unwrap();

        assert_eq!(
            fx.ledger.events_of_type(event_types::PETITION_FATED).await.len(),
            1
        );
        assert_eq!(
            fx.ledger
                .events_of_type(event_types::PETITION_WITHDRAWN)
                .await
                .len(),
            1
        );
    }
}
