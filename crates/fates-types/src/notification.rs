//! Observer notification preferences
//!
//! Stored best-effort at submission time; a storage failure never fails
//! the submission itself. Fate notifications are fire-and-forget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PetitionId;

/// How an observer wants to hear about fate assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    /// POST to an observer-owned webhook
    Webhook { url: String },
    /// Surface in the observer's inbox on next poll
    InApp,
}

/// Notification preference for one petition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub id: Uuid,
    pub petition_id: PetitionId,
    pub channel: NotificationChannel,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn webhook(petition_id: PetitionId, url: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            petition_id,
            channel: NotificationChannel::Webhook { url: url.into() },
            enabled,
            created_at: Utc::now(),
        }
    }

    pub fn in_app(petition_id: PetitionId, enabled: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            petition_id,
            channel: NotificationChannel::InApp,
            enabled,
            created_at: Utc::now(),
        }
    }
}
