//! Three Fates Ledger - Witnessed event records
//!
//! The ledger is:
//! - Append-only (no updates, no deletes)
//! - Witnessed (every event carries a blake3 digest over its canonical bytes)
//! - Canonical (payloads serialize with sorted keys, so any observer can
//!   re-derive the witness hash)
//! - Ordered by `emitted_at`; the append is the linearization point
//!
//! # Invariants
//!
//! 1. `witness_hash = blake3(canonical_json(payload))` for every event
//! 2. Every payload carries `schema_version`
//! 3. Emission failures surface as typed errors with the cause chained

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use fates_crypto::{format_witness_hash, ContentHasher};
use fates_types::{EventId, PetitionId, EVENT_SCHEMA_VERSION};

pub mod event_types {
    //! Event type names emitted to the ledger

    pub const PETITION_RECEIVED: &str = "petition.received";
    pub const PETITION_FATED: &str = "petition.fated";
    pub const PETITION_ACKNOWLEDGED: &str = "petition.fate.acknowledged";
    pub const KING_ACKNOWLEDGED_ESCALATION: &str = "petition.escalation.acknowledged_by_king";
    pub const REFERRAL_CREATED: &str = "petition.referral.created";
    pub const ESCALATION_TRIGGERED: &str = "petition.escalation.triggered";
    pub const DELIBERATION_CANCELLED: &str = "deliberation.session.cancelled";
    pub const PETITION_WITHDRAWN: &str = "petition.withdrawn";
    pub const ORPHANS_DETECTED: &str = "petition.monitoring.orphans_detected";
    pub const REPROCESSING_TRIGGERED: &str = "petition.monitoring.reprocessing_triggered";
}

/// Errors that can occur in ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Event emission failed for {event_type}")]
    EmissionFailed {
        event_type: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Event payload is not serializable: {message}")]
    Serialization { message: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// An immutable, witnessed event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: EventId,
    pub event_type: String,
    /// Canonical (sorted-keys) JSON payload
    pub payload: Value,
    /// `blake3:<hex>` digest over the canonical payload bytes
    pub witness_hash: String,
    pub schema_version: u32,
    pub emitted_at: DateTime<Utc>,
}

impl EventRecord {
    /// Re-derive the witness hash from the payload and compare.
    pub fn verify_witness(&self) -> bool {
        match canonical_json(&self.payload) {
            Ok(bytes) => {
                let digest = ContentHasher::new().hash(&bytes);
                format_witness_hash(&digest) == self.witness_hash
            }
            Err(_) => false,
        }
    }

    /// Petition this event pertains to, when the payload names one.
    pub fn petition_id(&self) -> Option<PetitionId> {
        self.payload
            .get("petition_id")
            .and_then(Value::as_str)
            .and_then(|s| PetitionId::parse(s).ok())
    }
}

/// Serialize a JSON value with all object keys sorted, recursively.
///
/// The sorted form is the input to the witness hash; it must not depend
/// on insertion order anywhere in the payload.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>> {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by_key(|(k, _)| k.as_str());
                let mut sorted = serde_json::Map::new();
                for (key, inner) in entries {
                    sorted.insert(key.clone(), sort(inner));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }

    serde_json::to_vec(&sort(value)).map_err(|e| LedgerError::Serialization {
        message: e.to_string(),
    })
}

/// Event writer contract.
///
/// `write` persists the event durably; on return the event is committed to
/// the ledger. Implementations never update or delete existing events.
#[async_trait::async_trait]
pub trait EventWriter: Send + Sync {
    /// Append a witnessed event built from `payload`.
    ///
    /// The writer injects `schema_version` into the payload if absent,
    /// computes the witness hash over the canonical bytes, and assigns
    /// `event_id` and `emitted_at`.
    async fn write(&self, event_type: &str, payload: Value) -> Result<EventRecord>;
}

/// Build a complete [`EventRecord`] from an event type and payload.
///
/// Shared by every writer implementation so the witnessing rules cannot
/// drift between adapters.
pub fn build_event(event_type: &str, mut payload: Value) -> Result<EventRecord> {
    if let Value::Object(ref mut map) = payload {
        map.entry("schema_version".to_string())
            .or_insert_with(|| Value::from(EVENT_SCHEMA_VERSION));
    }

    let canonical = canonical_json(&payload)?;
    let digest = ContentHasher::new().hash(&canonical);

    Ok(EventRecord {
        event_id: EventId::new(),
        event_type: event_type.to_string(),
        payload,
        witness_hash: format_witness_hash(&digest),
        schema_version: EVENT_SCHEMA_VERSION,
        emitted_at: Utc::now(),
    })
}

/// In-memory append-only ledger.
///
/// Thread-safe; the write-lock append is the linearization point across
/// petitions.
#[derive(Clone, Default)]
pub struct InMemoryEventLedger {
    events: Arc<RwLock<Vec<EventRecord>>>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in emission order.
    pub async fn events(&self) -> Vec<EventRecord> {
        self.events.read().await.clone()
    }

    /// Events of one type, in emission order.
    pub async fn events_of_type(&self, event_type: &str) -> Vec<EventRecord> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Events whose payload names the given petition.
    pub async fn events_for_petition(&self, petition_id: PetitionId) -> Vec<EventRecord> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.petition_id() == Some(petition_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl EventWriter for InMemoryEventLedger {
    async fn write(&self, event_type: &str, payload: Value) -> Result<EventRecord> {
        let record = build_event(event_type, payload)?;
        let mut events = self.events.write().await;
        events.push(record.clone());
        tracing::debug!(
            event_type = %record.event_type,
            event_id = %record.event_id,
            witness_hash = %record.witness_hash,
            "event appended",
        );
        Ok(record)
    }
}

/// Writer that fails the next N emissions, then delegates.
///
/// Exists for exercising the coordinator rollback path; never wired into
/// a running system.
pub struct FailingEventWriter {
    inner: InMemoryEventLedger,
    failures_remaining: Arc<RwLock<usize>>,
}

impl FailingEventWriter {
    pub fn new(inner: InMemoryEventLedger, failures: usize) -> Self {
        Self {
            inner,
            failures_remaining: Arc::new(RwLock::new(failures)),
        }
    }

    pub async fn fail_next(&self, count: usize) {
        *self.failures_remaining.write().await = count;
    }
}

#[async_trait::async_trait]
impl EventWriter for FailingEventWriter {
    async fn write(&self, event_type: &str, payload: Value) -> Result<EventRecord> {
        {
            let mut remaining = self.failures_remaining.write().await;
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::EmissionFailed {
                    event_type: event_type.to_string(),
                    source: "injected ledger outage".into(),
                });
            }
        }
        self.inner.write(event_type, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_and_witness() {
        let ledger = InMemoryEventLedger::new();
        let record = ledger
            .write(
                event_types::PETITION_RECEIVED,
                json!({
                    "petition_id": PetitionId::new().to_string(),
                    "petition_type": "GENERAL",
                    "realm": "default",
                }),
            )
            .await
            .unwrap();

        assert!(record.witness_hash.starts_with("blake3:"));
        assert!(record.verify_witness());
        assert_eq!(record.schema_version, EVENT_SCHEMA_VERSION);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_schema_version_injected() {
        let ledger = InMemoryEventLedger::new();
        let record = ledger
            .write(event_types::PETITION_FATED, json!({"fate": "ACKNOWLEDGED"}))
            .await
            .unwrap();
        assert_eq!(record.payload["schema_version"], json!(1));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({"zeta": 1, "alpha": {"nested_z": 2, "nested_a": 3}});
        let bytes = canonical_json(&value).unwrap();
        let rendered = String::from_utf8(bytes).unwrap();
        assert_eq!(
            rendered,
            r#"{"alpha":{"nested_a":3,"nested_z":2},"zeta":1}"#
        );
    }

    #[test]
    fn test_witness_hash_over_canonical_bytes() {
        let a = build_event("t", json!({"b": 1, "a": 2})).unwrap();
        let b = build_event("t", json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a.witness_hash, b.witness_hash);
    }

    #[tokio::test]
    async fn test_events_for_petition() {
        let ledger = InMemoryEventLedger::new();
        let petition_id = PetitionId::new();
        ledger
            .write(
                event_types::PETITION_RECEIVED,
                json!({"petition_id": petition_id.to_string()}),
            )
            .await
            .unwrap();
        ledger
            .write(
                event_types::PETITION_RECEIVED,
                json!({"petition_id": PetitionId::new().to_string()}),
            )
            .await
            .unwrap();

        let events = ledger.events_for_petition(petition_id).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_writer_fails_then_recovers() {
        let inner = InMemoryEventLedger::new();
        let writer = FailingEventWriter::new(inner.clone(), 1);

        let err = writer
            .write(event_types::PETITION_FATED, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::EmissionFailed { .. }));
        assert_eq!(inner.len().await, 0);

        writer
            .write(event_types::PETITION_FATED, json!({}))
            .await
            .unwrap();
        assert_eq!(inner.len().await, 1);
    }
}
