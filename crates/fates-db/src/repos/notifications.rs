//! PostgreSQL notification preference repository

use sqlx::PgPool;

use fates_types::{NotificationChannel, NotificationPreference, PetitionId, Result};

use crate::error::db_err;
use crate::models::DbNotificationPreference;

/// Notification preference repository over PostgreSQL
pub struct PgNotificationPreferenceRepository {
    pool: PgPool,
}

impl PgNotificationPreferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl fates_store::NotificationPreferenceRepository for PgNotificationPreferenceRepository {
    async fn save(&self, preference: &NotificationPreference) -> Result<()> {
        let (channel, webhook_url) = match &preference.channel {
            NotificationChannel::Webhook { url } => ("WEBHOOK", Some(url.clone())),
            NotificationChannel::InApp => ("IN_APP", None),
        };

        sqlx::query(
            r#"
            INSERT INTO notification_preferences (id, petition_id, channel, webhook_url, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (petition_id) DO UPDATE
            SET channel = EXCLUDED.channel,
                webhook_url = EXCLUDED.webhook_url,
                enabled = EXCLUDED.enabled
            "#,
        )
        .bind(preference.id)
        .bind(preference.petition_id.0)
        .bind(channel)
        .bind(webhook_url)
        .bind(preference.enabled)
        .bind(preference.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_by_petition(
        &self,
        petition_id: PetitionId,
    ) -> Result<Option<NotificationPreference>> {
        let row = sqlx::query_as::<_, DbNotificationPreference>(
            "SELECT id, petition_id, channel, webhook_url, enabled, created_at \
             FROM notification_preferences WHERE petition_id = $1",
        )
        .bind(petition_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbNotificationPreference::into_domain).transpose()
    }
}
