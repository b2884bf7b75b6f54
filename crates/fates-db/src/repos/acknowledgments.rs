//! PostgreSQL acknowledgment repository
//!
//! The unique index on `petition_id` is the authoritative guard against
//! a second acknowledgment; a violation is mapped back to the typed
//! error carrying the existing record's id.

use sqlx::PgPool;

use fates_types::{Acknowledgment, AcknowledgmentId, FatesError, PetitionId, Result};

use crate::error::{db_err, is_unique_violation};
use crate::models::DbAcknowledgment;

const ACK_COLUMNS: &str = "id, petition_id, reason_code, rationale, reference_petition_id, \
     acknowledging_archon_ids, acknowledged_by_king_id, acknowledged_at, witness_hash";

/// Acknowledgment repository over PostgreSQL
pub struct PgAcknowledgmentRepository {
    pool: PgPool,
}

impl PgAcknowledgmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl fates_store::AcknowledgmentRepository for PgAcknowledgmentRepository {
    async fn save(&self, acknowledgment: &Acknowledgment) -> Result<()> {
        let archon_ids: Vec<i32> = acknowledgment
            .acknowledging_archon_ids
            .iter()
            .map(|a| a.0 as i32)
            .collect();

        let result = sqlx::query(
            r#"
            INSERT INTO acknowledgments (
                id, petition_id, reason_code, rationale, reference_petition_id,
                acknowledging_archon_ids, acknowledged_by_king_id, acknowledged_at, witness_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(acknowledgment.id.0)
        .bind(acknowledgment.petition_id.0)
        .bind(acknowledgment.reason_code.as_str())
        .bind(&acknowledgment.rationale)
        .bind(acknowledgment.reference_petition_id.map(|r| r.0))
        .bind(&archon_ids)
        .bind(acknowledgment.acknowledged_by_king_id.map(|k| k.0))
        .bind(acknowledgment.acknowledged_at)
        .bind(&acknowledgment.witness_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(
                    acknowledgment_id = %acknowledgment.id,
                    petition_id = %acknowledgment.petition_id,
                    "acknowledgment saved",
                );
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                // Another acknowledgment won; report its id.
                let existing = self.get_by_petition(acknowledgment.petition_id).await?;
                Err(FatesError::AcknowledgmentAlreadyExists {
                    petition_id: acknowledgment.petition_id,
                    acknowledgment_id: existing
                        .map(|a| a.id)
                        .unwrap_or(acknowledgment.id),
                })
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get(&self, id: AcknowledgmentId) -> Result<Option<Acknowledgment>> {
        let row = sqlx::query_as::<_, DbAcknowledgment>(&format!(
            "SELECT {ACK_COLUMNS} FROM acknowledgments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbAcknowledgment::into_domain).transpose()
    }

    async fn get_by_petition(&self, petition_id: PetitionId) -> Result<Option<Acknowledgment>> {
        let row = sqlx::query_as::<_, DbAcknowledgment>(&format!(
            "SELECT {ACK_COLUMNS} FROM acknowledgments WHERE petition_id = $1"
        ))
        .bind(petition_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbAcknowledgment::into_domain).transpose()
    }
}
