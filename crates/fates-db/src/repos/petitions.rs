//! PostgreSQL petition repository
//!
//! `assign_fate_cas` runs its check sequence inside a transaction with
//! the row locked (`SELECT ... FOR UPDATE`), then swaps the state with
//! `UPDATE ... WHERE id = $1 AND state = $2 RETURNING *`. The row lock
//! plus the state predicate guarantee at most one winner under
//! concurrent invocations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use fates_types::{
    EscalationSource, FatesError, KingId, MotionId, Petition, PetitionId, PetitionState, Result,
    SignerId,
};

use crate::error::{db_err, is_unique_violation};
use crate::models::DbPetition;

const PETITION_COLUMNS: &str = "id, petition_type, text, state, submitter_id, content_hash, \
     realm, created_at, updated_at, fate_reason, co_signer_count, \
     escalation_source, escalated_at, escalated_to_realm, \
     adopted_as_motion_id, adopted_at, adopted_by_king_id";

/// Petition repository over PostgreSQL
pub struct PgPetitionRepository {
    pool: PgPool,
}

impl PgPetitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl fates_store::PetitionRepository for PgPetitionRepository {
    async fn save(&self, petition: &Petition) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO petitions (
                id, petition_type, text, state, submitter_id, content_hash,
                realm, created_at, updated_at, fate_reason, co_signer_count,
                escalation_source, escalated_at, escalated_to_realm,
                adopted_as_motion_id, adopted_at, adopted_by_king_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(petition.id.0)
        .bind(petition.petition_type.as_str())
        .bind(&petition.text)
        .bind(petition.state.as_str())
        .bind(petition.submitter_id.map(|s| s.0))
        .bind(petition.content_hash.map(|h| h.to_vec()))
        .bind(&petition.realm)
        .bind(petition.created_at)
        .bind(petition.updated_at)
        .bind(&petition.fate_reason)
        .bind(petition.co_signer_count as i32)
        .bind(petition.escalation_source.map(|s| s.as_str()))
        .bind(petition.escalated_at)
        .bind(&petition.escalated_to_realm)
        .bind(petition.adopted_as_motion_id.map(|m| m.0))
        .bind(petition.adopted_at)
        .bind(petition.adopted_by_king_id.map(|k| k.0))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(petition_id = %petition.id, "petition saved");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(FatesError::validation(
                "id",
                format!("petition {} already exists", petition.id),
            )),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get(&self, id: PetitionId) -> Result<Option<Petition>> {
        let row = sqlx::query_as::<_, DbPetition>(&format!(
            "SELECT {PETITION_COLUMNS} FROM petitions WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(DbPetition::into_domain).transpose()
    }

    async fn list_by_state(
        &self,
        state: PetitionState,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Petition>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM petitions WHERE state = $1")
            .bind(state.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let rows = sqlx::query_as::<_, DbPetition>(&format!(
            "SELECT {PETITION_COLUMNS} FROM petitions WHERE state = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(state.as_str())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let petitions = rows
            .into_iter()
            .map(DbPetition::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok((petitions, total.max(0) as u64))
    }

    async fn update_state(&self, id: PetitionId, state: PetitionState) -> Result<()> {
        let rows = sqlx::query("UPDATE petitions SET state = $2, updated_at = $3 WHERE id = $1")
            .bind(id.0)
            .bind(state.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();

        if rows == 0 {
            return Err(FatesError::PetitionNotFound { petition_id: id });
        }
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
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT state FROM petitions WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        let current = PetitionState::parse(
            &current.ok_or(FatesError::PetitionNotFound { petition_id: id })?,
        )?;
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
        let escalated_at = (new == PetitionState::Escalated).then_some(now);
        let row = sqlx::query_as::<_, DbPetition>(&format!(
            r#"
            UPDATE petitions
            SET state = $3,
                updated_at = $4,
                fate_reason = COALESCE($5, fate_reason),
                escalation_source = COALESCE($6, escalation_source),
                escalated_at = COALESCE($7, escalated_at),
                escalated_to_realm = COALESCE($8, escalated_to_realm)
            WHERE id = $1 AND state = $2
            RETURNING {PETITION_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(expected.as_str())
        .bind(new.as_str())
        .bind(now)
        .bind(&fate_reason)
        .bind(escalation_source.map(|s| s.as_str()))
        .bind(escalated_at)
        .bind(&escalated_to_realm)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        // The row was locked above, so the predicate cannot miss here; a
        // None still maps to the CAS failure for safety.
        let row = row.ok_or(FatesError::ConcurrentModification {
            petition_id: id,
            expected,
            actual: current,
        })?;

        tx.commit().await.map_err(db_err)?;

        tracing::info!(petition_id = %id, fate = %new, "fate assigned");
        row.into_domain()
    }

    async fn mark_adopted(
        &self,
        id: PetitionId,
        motion_id: MotionId,
        king_id: KingId,
    ) -> Result<Petition> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing: Option<Option<uuid::Uuid>> = sqlx::query_scalar(
            "SELECT adopted_as_motion_id FROM petitions WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let existing = existing.ok_or(FatesError::PetitionNotFound { petition_id: id })?;
        if let Some(adopted) = existing {
            return Err(FatesError::AlreadyAdopted {
                petition_id: id,
                motion_id: MotionId::from_uuid(adopted),
            });
        }

        let row = sqlx::query_as::<_, DbPetition>(&format!(
            r#"
            UPDATE petitions
            SET adopted_as_motion_id = $2, adopted_at = $3, adopted_by_king_id = $4, updated_at = $3
            WHERE id = $1
            RETURNING {PETITION_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(motion_id.0)
        .bind(Utc::now())
        .bind(king_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        tracing::info!(petition_id = %id, motion_id = %motion_id, "petition adopted");
        row.into_domain()
    }

    async fn find_by_state(
        &self,
        state: PetitionState,
        received_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Petition>> {
        let rows = match received_before {
            Some(cutoff) => {
                sqlx::query_as::<_, DbPetition>(&format!(
                    "SELECT {PETITION_COLUMNS} FROM petitions \
                     WHERE state = $1 AND created_at < $2 ORDER BY created_at ASC"
                ))
                .bind(state.as_str())
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, DbPetition>(&format!(
                    "SELECT {PETITION_COLUMNS} FROM petitions \
                     WHERE state = $1 ORDER BY created_at ASC"
                ))
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        rows.into_iter().map(DbPetition::into_domain).collect()
    }

    async fn get_queue_depth(&self, state: Option<PetitionState>) -> Result<u64> {
        let count: i64 = match state {
            Some(state) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM petitions WHERE state = $1")
                    .bind(state.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM petitions WHERE state IN ('RECEIVED', 'DELIBERATING')",
                )
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }

    async fn add_co_signer(&self, id: PetitionId, signer_id: SignerId) -> Result<u32> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM petitions WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        let state =
            PetitionState::parse(&state.ok_or(FatesError::PetitionNotFound { petition_id: id })?)?;
        if state.is_terminal() {
            return Err(FatesError::AlreadyFated {
                petition_id: id,
                terminal_state: state,
            });
        }

        let inserted = sqlx::query(
            "INSERT INTO petition_co_signers (petition_id, signer_id, signed_at) VALUES ($1, $2, $3)",
        )
        .bind(id.0)
        .bind(signer_id.0)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(FatesError::DuplicateCoSigner {
                    petition_id: id,
                    signer_id,
                });
            }
            return Err(db_err(e));
        }

        let count: i32 = sqlx::query_scalar(
            "UPDATE petitions \
             SET co_signer_count = co_signer_count + 1, updated_at = $2 \
             WHERE id = $1 RETURNING co_signer_count",
        )
        .bind(id.0)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(count.max(0) as u32)
    }

    async fn list_escalated_by_realm(
        &self,
        realm: &str,
        after: Option<(DateTime<Utc>, PetitionId)>,
        limit: u32,
    ) -> Result<Vec<Petition>> {
        let rows = match after {
            Some((cursor_at, cursor_id)) => {
                sqlx::query_as::<_, DbPetition>(&format!(
                    "SELECT {PETITION_COLUMNS} FROM petitions \
                     WHERE state = 'ESCALATED' AND escalated_to_realm = $1 \
                       AND escalated_at IS NOT NULL \
                       AND (escalated_at, id) > ($2, $3) \
                     ORDER BY escalated_at ASC, id ASC LIMIT $4"
                ))
                .bind(realm)
                .bind(cursor_at)
                .bind(cursor_id.0)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, DbPetition>(&format!(
                    "SELECT {PETITION_COLUMNS} FROM petitions \
                     WHERE state = 'ESCALATED' AND escalated_to_realm = $1 \
                       AND escalated_at IS NOT NULL \
                     ORDER BY escalated_at ASC, id ASC LIMIT $2"
                ))
                .bind(realm)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        rows.into_iter().map(DbPetition::into_domain).collect()
    }
}
