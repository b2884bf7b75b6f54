//! PostgreSQL event writer
//!
//! Appends witnessed events to the `events` table. Append-only: there is
//! no update or delete path through this type, and the table carries no
//! code that would produce one.

use sqlx::PgPool;

use fates_ledger::{build_event, EventRecord, EventWriter, LedgerError};

/// Event writer over PostgreSQL
pub struct PgEventWriter {
    pool: PgPool,
}

impl PgEventWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventWriter for PgEventWriter {
    async fn write(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> fates_ledger::Result<EventRecord> {
        let record = build_event(event_type, payload)?;

        sqlx::query(
            r#"
            INSERT INTO events (event_id, event_type, payload, witness_hash, schema_version, emitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.event_id.0)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(&record.witness_hash)
        .bind(record.schema_version as i32)
        .bind(record.emitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::EmissionFailed {
            event_type: event_type.to_string(),
            source: Box::new(e),
        })?;

        tracing::debug!(
            event_type = %record.event_type,
            event_id = %record.event_id,
            witness_hash = %record.witness_hash,
            "event appended",
        );
        Ok(record)
    }
}
