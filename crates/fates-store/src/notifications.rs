//! Notification preference repository contract and in-memory adapter
//!
//! Preferences are written best-effort at submission time; callers log
//! and continue when a save fails.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use fates_types::{NotificationPreference, PetitionId, Result};

/// Repository of per-petition notification preferences
#[async_trait::async_trait]
pub trait NotificationPreferenceRepository: Send + Sync {
    /// Persist a preference, replacing any previous one for the petition.
    async fn save(&self, preference: &NotificationPreference) -> Result<()>;

    /// Fetch the preference for a petition.
    async fn get_by_petition(
        &self,
        petition_id: PetitionId,
    ) -> Result<Option<NotificationPreference>>;
}

/// In-memory notification preference repository
#[derive(Clone, Default)]
pub struct InMemoryNotificationPreferenceRepository {
    prefs: Arc<RwLock<HashMap<PetitionId, NotificationPreference>>>,
}

impl InMemoryNotificationPreferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl NotificationPreferenceRepository for InMemoryNotificationPreferenceRepository {
    async fn save(&self, preference: &NotificationPreference) -> Result<()> {
        self.prefs
            .write()
            .await
            .insert(preference.petition_id, preference.clone());
        Ok(())
    }

    async fn get_by_petition(
        &self,
        petition_id: PetitionId,
    ) -> Result<Option<NotificationPreference>> {
        Ok(self.prefs.read().await.get(&petition_id).cloned())
    }
}
