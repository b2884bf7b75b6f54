//! Acknowledgment repository contract and in-memory adapter
//!
//! At most one acknowledgment exists per petition; the adapter enforces
//! the unique constraint on `petition_id`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use fates_types::{Acknowledgment, AcknowledgmentId, FatesError, PetitionId, Result};

/// Repository of acknowledgment records (1:1 with ACKNOWLEDGED petitions)
#[async_trait::async_trait]
pub trait AcknowledgmentRepository: Send + Sync {
    /// Persist a new acknowledgment; fails if one already exists for the
    /// petition.
    async fn save(&self, acknowledgment: &Acknowledgment) -> Result<()>;

    /// Fetch by acknowledgment id.
    async fn get(&self, id: AcknowledgmentId) -> Result<Option<Acknowledgment>>;

    /// Fetch by petition id.
    async fn get_by_petition(&self, petition_id: PetitionId) -> Result<Option<Acknowledgment>>;
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<AcknowledgmentId, Acknowledgment>,
    by_petition: HashMap<PetitionId, AcknowledgmentId>,
}

/// In-memory acknowledgment repository
#[derive(Clone, Default)]
pub struct InMemoryAcknowledgmentRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryAcknowledgmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AcknowledgmentRepository for InMemoryAcknowledgmentRepository {
    async fn save(&self, acknowledgment: &Acknowledgment) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.by_petition.get(&acknowledgment.petition_id) {
            return Err(FatesError::AcknowledgmentAlreadyExists {
                petition_id: acknowledgment.petition_id,
                acknowledgment_id: *existing,
            });
        }
        inner
            .by_petition
            .insert(acknowledgment.petition_id, acknowledgment.id);
        inner.by_id.insert(acknowledgment.id, acknowledgment.clone());
        tracing::debug!(
            acknowledgment_id = %acknowledgment.id,
            petition_id = %acknowledgment.petition_id,
            reason_code = %acknowledgment.reason_code,
            "acknowledgment saved",
        );
        Ok(())
    }

    async fn get(&self, id: AcknowledgmentId) -> Result<Option<Acknowledgment>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn get_by_petition(&self, petition_id: PetitionId) -> Result<Option<Acknowledgment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_petition
            .get(&petition_id)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fates_types::{ArchonId, ReasonCode};

    fn ack_for(petition_id: PetitionId) -> Acknowledgment {
        Acknowledgment::new(
            AcknowledgmentId::new(),
            petition_id,
            ReasonCode::Noted,
            None,
            None,
            vec![ArchonId(1), ArchonId(2)],
            None,
            Utc::now(),
            "blake3:0011".to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unique_per_petition() {
        let repo = InMemoryAcknowledgmentRepository::new();
        let petition_id = PetitionId::new();
        let first = ack_for(petition_id);
        repo.save(&first).await.unwrap();

        let err = repo.save(&ack_for(petition_id)).await.unwrap_err();
        match err {
            FatesError::AcknowledgmentAlreadyExists {
                acknowledgment_id, ..
            } => assert_eq!(acknowledgment_id, first.id),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_by_petition() {
        let repo = InMemoryAcknowledgmentRepository::new();
        let petition_id = PetitionId::new();
        let ack = ack_for(petition_id);
        repo.save(&ack).await.unwrap();

        assert_eq!(repo.get(ack.id).await.unwrap().unwrap().id, ack.id);
        assert_eq!(
            repo.get_by_petition(petition_id).await.unwrap().unwrap().id,
            ack.id
        );
        assert!(repo.get_by_petition(PetitionId::new()).await.unwrap().is_none());
    }
}
