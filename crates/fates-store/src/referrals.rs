//! Referral repository contract and in-memory adapter

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use fates_types::{FatesError, PetitionId, Referral, ReferralId, ReferralStatus, Result};

/// Repository of referral records (1:1 with REFERRED petitions)
#[async_trait::async_trait]
pub trait ReferralRepository: Send + Sync {
    /// Persist a new referral; fails if one already exists for the petition.
    async fn save(&self, referral: &Referral) -> Result<()>;

    /// Fetch by referral id.
    async fn get(&self, id: ReferralId) -> Result<Option<Referral>>;

    /// Fetch by petition id.
    async fn get_by_petition(&self, petition_id: PetitionId) -> Result<Option<Referral>>;

    /// Mark a referral EXPIRED if it is still PENDING.
    ///
    /// Returns the expired referral, or `None` when the referral already
    /// left PENDING (timeout redelivery is a no-op).
    async fn expire_if_pending(&self, id: ReferralId) -> Result<Option<Referral>>;

    /// Mark a referral RESOLVED (Knight responded before the deadline).
    async fn mark_resolved(&self, id: ReferralId) -> Result<Referral>;
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<ReferralId, Referral>,
    by_petition: HashMap<PetitionId, ReferralId>,
}

/// In-memory referral repository
#[derive(Clone, Default)]
pub struct InMemoryReferralRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryReferralRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReferralRepository for InMemoryReferralRepository {
    async fn save(&self, referral: &Referral) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.by_petition.contains_key(&referral.petition_id) {
            return Err(FatesError::validation(
                "petition_id",
                format!("petition {} already has a referral", referral.petition_id),
            ));
        }
        inner.by_petition.insert(referral.petition_id, referral.id);
        inner.by_id.insert(referral.id, referral.clone());
        tracing::debug!(
            referral_id = %referral.id,
            petition_id = %referral.petition_id,
            deadline = %referral.deadline,
            "referral saved",
        );
        Ok(())
    }

    async fn get(&self, id: ReferralId) -> Result<Option<Referral>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn get_by_petition(&self, petition_id: PetitionId) -> Result<Option<Referral>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_petition
            .get(&petition_id)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn expire_if_pending(&self, id: ReferralId) -> Result<Option<Referral>> {
        let mut inner = self.inner.write().await;
        let referral = inner
            .by_id
            .get_mut(&id)
            .ok_or(FatesError::ReferralNotFound { referral_id: id })?;
        if referral.status != ReferralStatus::Pending {
            return Ok(None);
        }
        referral.status = ReferralStatus::Expired;
        tracing::info!(referral_id = %id, "referral expired");
        Ok(Some(referral.clone()))
    }

    async fn mark_resolved(&self, id: ReferralId) -> Result<Referral> {
        let mut inner = self.inner.write().await;
        let referral = inner
            .by_id
            .get_mut(&id)
            .ok_or(FatesError::ReferralNotFound { referral_id: id })?;
        referral.status = ReferralStatus::Resolved;
        Ok(referral.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn referral_for(petition_id: PetitionId) -> Referral {
        let now = Utc::now();
        Referral {
            id: ReferralId::new(),
            petition_id,
            realm_id: "governance".to_string(),
            deadline: Referral::deadline_after(now, 3),
            created_at: now,
            status: ReferralStatus::Pending,
            witness_hash: "blake3:0011".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unique_per_petition() {
        let repo = InMemoryReferralRepository::new();
        let petition_id = PetitionId::new();
        repo.save(&referral_for(petition_id)).await.unwrap();
        assert!(repo.save(&referral_for(petition_id)).await.is_err());
    }

    #[tokio::test]
    async fn test_expire_if_pending_is_idempotent() {
        let repo = InMemoryReferralRepository::new();
        let referral = referral_for(PetitionId::new());
        repo.save(&referral).await.unwrap();

        let expired = repo.expire_if_pending(referral.id).await.unwrap();
        assert_eq!(expired.unwrap().status, ReferralStatus::Expired);

        // Second delivery of the same timeout: no-op.
        assert!(repo.expire_if_pending(referral.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolved_referral_does_not_expire() {
        let repo = InMemoryReferralRepository::new();
        let referral = referral_for(PetitionId::new());
        repo.save(&referral).await.unwrap();
        repo.mark_resolved(referral.id).await.unwrap();

        assert!(repo.expire_if_pending(referral.id).await.unwrap().is_none());
        assert_eq!(
            repo.get(referral.id).await.unwrap().unwrap().status,
            ReferralStatus::Resolved
        );
    }
}
