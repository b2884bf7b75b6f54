//! PostgreSQL referral repository

use sqlx::PgPool;

use fates_types::{FatesError, PetitionId, Referral, ReferralId, Result};

use crate::error::{db_err, is_unique_violation};
use crate::models::DbReferral;

const REFERRAL_COLUMNS: &str =
    "id, petition_id, realm_id, deadline, created_at, status, witness_hash";

/// Referral repository over PostgreSQL
pub struct PgReferralRepository {
    pool: PgPool,
}

impl PgReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl fates_store::ReferralRepository for PgReferralRepository {
    async fn save(&self, referral: &Referral) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO referrals (id, petition_id, realm_id, deadline, created_at, status, witness_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(referral.id.0)
        .bind(referral.petition_id.0)
        .bind(&referral.realm_id)
        .bind(referral.deadline)
        .bind(referral.created_at)
        .bind(referral.status.as_str())
        .bind(&referral.witness_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(
                    referral_id = %referral.id,
                    petition_id = %referral.petition_id,
                    "referral saved",
                );
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(FatesError::validation(
                "petition_id",
                format!("petition {} already has a referral", referral.petition_id),
            )),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get(&self, id: ReferralId) -> Result<Option<Referral>> {
        let row = sqlx::query_as::<_, DbReferral>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbReferral::into_domain).transpose()
    }

    async fn get_by_petition(&self, petition_id: PetitionId) -> Result<Option<Referral>> {
        let row = sqlx::query_as::<_, DbReferral>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE petition_id = $1"
        ))
        .bind(petition_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbReferral::into_domain).transpose()
    }

    async fn expire_if_pending(&self, id: ReferralId) -> Result<Option<Referral>> {
        // Single conditional update: only a PENDING row expires, so a
        // re-delivered timeout sees zero rows and no-ops.
        let row = sqlx::query_as::<_, DbReferral>(&format!(
            "UPDATE referrals SET status = 'EXPIRED' \
             WHERE id = $1 AND status = 'PENDING' \
             RETURNING {REFERRAL_COLUMNS}"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                tracing::info!(referral_id = %id, "referral expired");
                Ok(Some(row.into_domain()?))
            }
            None => {
                // Distinguish "already handled" from "never existed".
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT 1 FROM referrals WHERE id = $1")
                        .bind(id.0)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_err)?;
                if exists.is_none() {
                    return Err(FatesError::ReferralNotFound { referral_id: id });
                }
                Ok(None)
            }
        }
    }

    async fn mark_resolved(&self, id: ReferralId) -> Result<Referral> {
        let row = sqlx::query_as::<_, DbReferral>(&format!(
            "UPDATE referrals SET status = 'RESOLVED' WHERE id = $1 RETURNING {REFERRAL_COLUMNS}"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.ok_or(FatesError::ReferralNotFound { referral_id: id })?
            .into_domain()
    }
}
