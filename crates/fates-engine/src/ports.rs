//! Ports to external collaborators
//!
//! The engine depends on abstract collaborators at its seams: the realm
//! registry, the deliberation layer, and fate notification delivery. Each
//! port ships with an in-memory or no-op implementation carrying the same
//! semantics as production adapters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use fates_types::{ArchonId, PetitionId, PetitionState, Result, SessionId, StatusToken};

// ============================================================================
// Realm Registry
// ============================================================================

/// Registry of routing realms
#[async_trait::async_trait]
pub trait RealmRegistry: Send + Sync {
    /// Whether the realm exists.
    async fn contains(&self, realm: &str) -> bool;

    /// Name of the default realm used when a submission names none.
    async fn default_realm(&self) -> String;
}

/// Static realm registry seeded at startup
#[derive(Clone)]
pub struct StaticRealmRegistry {
    realms: Arc<HashSet<String>>,
    default_realm: String,
}

impl StaticRealmRegistry {
    pub fn new(realms: impl IntoIterator<Item = String>, default_realm: impl Into<String>) -> Self {
        let default_realm = default_realm.into();
        let mut set: HashSet<String> = realms.into_iter().collect();
        set.insert(default_realm.clone());
        Self {
            realms: Arc::new(set),
            default_realm,
        }
    }
}

impl Default for StaticRealmRegistry {
    fn default() -> Self {
        Self::new(
            ["governance".to_string(), "economy".to_string()],
            "default",
        )
    }
}

#[async_trait::async_trait]
impl RealmRegistry for StaticRealmRegistry {
    async fn contains(&self, realm: &str) -> bool {
        self.realms.contains(realm)
    }

    async fn default_realm(&self) -> String {
        self.default_realm.clone()
    }
}

// ============================================================================
// Deliberation Session Directory
// ============================================================================

/// A deliberation session, abstracted to what fate execution needs:
/// its age (dwell enforcement) and its participants (cancellation events).
#[derive(Debug, Clone, PartialEq)]
pub struct DeliberationSession {
    pub session_id: SessionId,
    pub petition_id: PetitionId,
    pub created_at: DateTime<Utc>,
    pub participating_archons: Vec<ArchonId>,
}

/// Lookup of active deliberation sessions by petition
#[async_trait::async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn session_for_petition(
        &self,
        petition_id: PetitionId,
    ) -> Result<Option<DeliberationSession>>;
}

/// In-memory session directory
#[derive(Clone, Default)]
pub struct InMemorySessionDirectory {
    sessions: Arc<RwLock<HashMap<PetitionId, DeliberationSession>>>,
}

impl InMemorySessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: DeliberationSession) {
        self.sessions
            .write()
            .await
            .insert(session.petition_id, session);
    }

    pub async fn remove(&self, petition_id: PetitionId) {
        self.sessions.write().await.remove(&petition_id);
    }
}

#[async_trait::async_trait]
impl SessionDirectory for InMemorySessionDirectory {
    async fn session_for_petition(
        &self,
        petition_id: PetitionId,
    ) -> Result<Option<DeliberationSession>> {
        Ok(self.sessions.read().await.get(&petition_id).cloned())
    }
}

// ============================================================================
// Deliberation Orchestrator
// ============================================================================

/// Port into the deliberation rollout layer.
///
/// The orphan monitor uses it to push stuck petitions back into
/// deliberation; the rollout itself lives outside this engine.
#[async_trait::async_trait]
pub trait DeliberationOrchestrator: Send + Sync {
    async fn initiate_deliberation(&self, petition_id: PetitionId) -> Result<()>;
}

/// Orchestrator that records initiations without acting on them
#[derive(Clone, Default)]
pub struct RecordingOrchestrator {
    initiated: Arc<RwLock<Vec<PetitionId>>>,
}

impl RecordingOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn initiated(&self) -> Vec<PetitionId> {
        self.initiated.read().await.clone()
    }
}

#[async_trait::async_trait]
impl DeliberationOrchestrator for RecordingOrchestrator {
    async fn initiate_deliberation(&self, petition_id: PetitionId) -> Result<()> {
        self.initiated.write().await.push(petition_id);
        Ok(())
    }
}

// ============================================================================
// Fate Notification
// ============================================================================

/// Fire-and-forget delivery of fate notifications to observers.
///
/// Failures are logged by callers and never propagate into fate
/// assignment.
#[async_trait::async_trait]
pub trait FateNotifier: Send + Sync {
    async fn notify_fate_assigned(
        &self,
        petition_id: PetitionId,
        fate: PetitionState,
        fate_reason: Option<&str>,
        status_token: StatusToken,
    ) -> Result<()>;
}

/// Notifier that drops everything on the floor
#[derive(Clone, Copy, Default)]
pub struct NoopFateNotifier;

#[async_trait::async_trait]
impl FateNotifier for NoopFateNotifier {
    async fn notify_fate_assigned(
        &self,
        _petition_id: PetitionId,
        _fate: PetitionState,
        _fate_reason: Option<&str>,
        _status_token: StatusToken,
    ) -> Result<()> {
        Ok(())
    }
}
