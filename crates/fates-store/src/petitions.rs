//! Petition repository contract and in-memory adapter
//!
//! `assign_fate_cas` is the atomic heart of the store. Its checks run in a
//! fixed order as a single serialized operation:
//!
//! 1. missing petition -> not found
//! 2. terminal current state -> already fated
//! 3. `current -> new` off-matrix -> invalid transition
//! 4. `current != expected` -> concurrent modification
//! 5. otherwise swap the state, stamp `updated_at`, and populate the
//!    escalation triple when the new state is ESCALATED (never
//!    overwriting an escalation already on record)

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use fates_types::{
    EscalationSource, FatesError, KingId, MotionId, Petition, PetitionId, PetitionState, Result,
    SignerId,
};

/// Repository of petitions with atomic CAS state transitions
#[async_trait::async_trait]
pub trait PetitionRepository: Send + Sync {
    /// Persist a new petition; fails if the id already exists.
    async fn save(&self, petition: &Petition) -> Result<()>;

    /// Fetch a petition by id.
    async fn get(&self, id: PetitionId) -> Result<Option<Petition>>;

    /// List petitions in `state`, newest first, with the unfiltered total
    /// count for that state.
    async fn list_by_state(
        &self,
        state: PetitionState,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Petition>, u64)>;

    /// Unconditional state update. Used ONLY by the fate coordinator's
    /// rollback path.
    async fn update_state(&self, id: PetitionId, state: PetitionState) -> Result<()>;

    /// Atomic compare-and-swap fate assignment. See module docs for the
    /// check order. Under concurrent invocations at most one caller
    /// observes success.
    async fn assign_fate_cas(
        &self,
        id: PetitionId,
        expected: PetitionState,
        new: PetitionState,
        fate_reason: Option<String>,
        escalation_source: Option<EscalationSource>,
        escalated_to_realm: Option<String>,
    ) -> Result<Petition>;

    /// Write the adoption triple exactly once; fails if already adopted.
    async fn mark_adopted(
        &self,
        id: PetitionId,
        motion_id: MotionId,
        king_id: KingId,
    ) -> Result<Petition>;

    /// Find petitions in `state`, optionally only those received strictly
    /// before `received_before`.
    async fn find_by_state(
        &self,
        state: PetitionState,
        received_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Petition>>;

    /// Count petitions for capacity checks. `None` counts non-terminal
    /// petitions.
    async fn get_queue_depth(&self, state: Option<PetitionState>) -> Result<u64>;

    /// Record a co-signature and return the new count. Each signer may
    /// co-sign a petition once; terminal petitions reject co-signatures.
    async fn add_co_signer(&self, id: PetitionId, signer_id: SignerId) -> Result<u32>;

    /// Keyset page of ESCALATED petitions for one realm, ascending by
    /// `(escalated_at, id)`, strictly after the cursor position.
    async fn list_escalated_by_realm(
        &self,
        realm: &str,
        after: Option<(DateTime<Utc>, PetitionId)>,
        limit: u32,
    ) -> Result<Vec<Petition>>;
}

#[derive(Default)]
struct Inner {
    petitions: HashMap<PetitionId, Petition>,
    co_signers: HashMap<PetitionId, HashSet<SignerId>>,
}

/// In-memory petition repository.
///
/// All operations take the single write lock, so the CAS check-and-swap
/// is serialized exactly like the database adapter's row-level
/// `UPDATE ... WHERE state = expected`.
#[derive(Clone, Default)]
pub struct InMemoryPetitionRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryPetitionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PetitionRepository for InMemoryPetitionRepository {
    async fn save(&self, petition: &Petition) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.petitions.contains_key(&petition.id) {
            return Err(FatesError::validation(
                "id",
                format!("petition {} already exists", petition.id),
            ));
        }
        inner.petitions.insert(petition.id, petition.clone());
        tracing::debug!(petition_id = %petition.id, state = %petition.state, "petition saved");
        Ok(())
    }

    async fn get(&self, id: PetitionId) -> Result<Option<Petition>> {
        Ok(self.inner.read().await.petitions.get(&id).cloned())
    }

    async fn list_by_state(
        &self,
        state: PetitionState,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Petition>, u64)> {
        let inner = self.inner.read().await;
        let mut matching: Vec<Petition> = inner
            .petitions
            .values()
            .filter(|p| p.state == state)
            .cloned()
            .collect();
        let total = matching.len() as u64;
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_state(&self, id: PetitionId, state: PetitionState) -> Result<()> {
        let mut inner = self.inner.write().await;
        let petition = inner
            .petitions
            .get_mut(&id)
            .ok_or(FatesError::PetitionNotFound { petition_id: id })?;
        petition.state = state;
        petition.updated_at = Utc::now();
        tracing::debug!(petition_id = %id, new_state = %state, "petition state updated");
        Ok(())
    }

    async fn assign_fate_cas(
        &self,
        id: PetitionId,
        expected: PetitionState,
        new: PetitionState,
        fate_reason: Option<String>,
        escalation_source: Option<EscalationSource>,
        escalated_to_realm: Option<String>,
    ) -> Result<Petition> {
        let mut inner = self.inner.write().await;
        let petition = inner
            .petitions
            .get_mut(&id)
            .ok_or(FatesError::PetitionNotFound { petition_id: id })?;

        let current = petition.state;
        if current.is_terminal() {
            return Err(FatesError::AlreadyFated {
                petition_id: id,
                terminal_state: current,
            });
        }
        if !current.can_transition_to(new) {
            return Err(FatesError::InvalidStateTransition {
                from: current,
                to: new,
                allowed: current.valid_transitions().to_vec(),
            });
        }
        if current != expected {
            tracing::warn!(
                petition_id = %id,
                expected = %expected,
                actual = %current,
                "fate CAS observed concurrent modification",
            );
            return Err(FatesError::ConcurrentModification {
                petition_id: id,
                expected,
                actual: current,
            });
        }

        let now = Utc::now();
        petition.state = new;
        petition.updated_at = now;
        if fate_reason.is_some() {
            petition.fate_reason = fate_reason;
        }
        if new == PetitionState::Escalated {
            // COALESCE semantics: an escalation already on record wins.
            petition.escalation_source = petition.escalation_source.or(escalation_source);
            petition.escalated_at = petition.escalated_at.or(Some(now));
            if petition.escalated_to_realm.is_none() {
                petition.escalated_to_realm = escalated_to_realm;
            }
        }

        tracing::info!(
            petition_id = %id,
            fate = %new,
            escalation_source = ?petition.escalation_source,
            "fate assigned",
        );
        Ok(petition.clone())
    }

    async fn mark_adopted(
        &self,
        id: PetitionId,
        motion_id: MotionId,
        king_id: KingId,
    ) -> Result<Petition> {
        let mut inner = self.inner.write().await;
        let petition = inner
            .petitions
            .get_mut(&id)
            .ok_or(FatesError::PetitionNotFound { petition_id: id })?;

        let adopted = petition.with_adoption(motion_id, king_id, Utc::now())?;
        *petition = adopted.clone();
        tracing::info!(petition_id = %id, motion_id = %motion_id, king_id = %king_id, "petition adopted");
        Ok(adopted)
    }

    async fn find_by_state(
        &self,
        state: PetitionState,
        received_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Petition>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<Petition> = inner
            .petitions
            .values()
            .filter(|p| p.state == state)
            .filter(|p| received_before.map(|cutoff| p.created_at < cutoff).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn get_queue_depth(&self, state: Option<PetitionState>) -> Result<u64> {
        let inner = self.inner.read().await;
        let count = inner
            .petitions
            .values()
            .filter(|p| match state {
                Some(state) => p.state == state,
                None => !p.state.is_terminal(),
            })
            .count();
        Ok(count as u64)
    }

    async fn add_co_signer(&self, id: PetitionId, signer_id: SignerId) -> Result<u32> {
        let mut inner = self.inner.write().await;
        let petition = inner
            .petitions
            .get(&id)
            .ok_or(FatesError::PetitionNotFound { petition_id: id })?;
        if petition.state.is_terminal() {
            return Err(FatesError::AlreadyFated {
                petition_id: id,
                terminal_state: petition.state,
            });
        }

        let signers = inner.co_signers.entry(id).or_default();
        if !signers.insert(signer_id) {
            return Err(FatesError::DuplicateCoSigner {
                petition_id: id,
                signer_id,
            });
        }
        let count = signers.len() as u32;

        let petition = inner
            .petitions
            .get_mut(&id)
            .ok_or(FatesError::PetitionNotFound { petition_id: id })?;
        petition.co_signer_count = count;
        petition.updated_at = Utc::now();
        Ok(count)
    }

    async fn list_escalated_by_realm(
        &self,
        realm: &str,
        after: Option<(DateTime<Utc>, PetitionId)>,
        limit: u32,
    ) -> Result<Vec<Petition>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<Petition> = inner
            .petitions
            .values()
            .filter(|p| p.state == PetitionState::Escalated)
            .filter(|p| p.escalated_to_realm.as_deref() == Some(realm))
            .filter(|p| p.escalated_at.is_some())
            .filter(|p| match after {
                Some((cursor_at, cursor_id)) => {
                    let escalated_at = p.escalated_at.unwrap_or(p.updated_at);
                    (escalated_at, p.id) > (cursor_at, cursor_id)
                }
                None => true,
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            let at_a = a.escalated_at.unwrap_or(a.updated_at);
            let at_b = b.escalated_at.unwrap_or(b.updated_at);
            at_a.cmp(&at_b).then(a.id.cmp(&b.id))
        });
        matching.truncate(limit as usize);
        Ok(matching)
    }
}
