//! Orphan petition monitoring
//!
//! A petition stuck in RECEIVED beyond the staleness threshold (default
//! 24h) is an orphan. Detection is a periodic read that emits a witnessed
//! event when - and only when - orphans exist: silence means nothing is
//! stuck. Operators can push orphans back into deliberation manually.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use fates_ledger::{event_types, EventWriter};
use fates_store::PetitionRepository;
use fates_types::{FatesError, PetitionId, PetitionState, PetitionType, Result};

use crate::events::{OrphansDetectedEvent, ReprocessingTriggeredEvent};
use crate::halt::{ensure_not_halted, HaltGate};
use crate::ports::DeliberationOrchestrator;

/// One orphaned petition
#[derive(Debug, Clone)]
pub struct OrphanInfo {
    pub petition_id: PetitionId,
    pub petition_type: PetitionType,
    pub created_at: DateTime<Utc>,
    pub age_hours: f64,
    pub co_signer_count: u32,
}

/// Result of one detection scan
#[derive(Debug, Clone)]
pub struct OrphanDetectionResult {
    pub detected_at: DateTime<Utc>,
    pub threshold_hours: u32,
    pub orphans: Vec<OrphanInfo>,
}

impl OrphanDetectionResult {
    pub fn total(&self) -> usize {
        self.orphans.len()
    }

    pub fn oldest_age_hours(&self) -> f64 {
        self.orphans
            .iter()
            .map(|o| o.age_hours)
            .fold(0.0, f64::max)
    }

    pub fn petition_ids(&self) -> Vec<PetitionId> {
        self.orphans.iter().map(|o| o.petition_id).collect()
    }
}

/// Partition of a manual reprocessing request
#[derive(Debug, Clone)]
pub struct ReprocessResult {
    pub success: Vec<PetitionId>,
    pub failed: Vec<PetitionId>,
}

/// Periodic scanner for petitions stuck in RECEIVED
#[derive(Clone)]
pub struct OrphanMonitor {
    petitions: Arc<dyn PetitionRepository>,
    event_writer: Option<Arc<dyn EventWriter>>,
    orchestrator: Arc<dyn DeliberationOrchestrator>,
    halt_gate: Arc<dyn HaltGate>,
    threshold_hours: u32,
}

impl OrphanMonitor {
    pub fn new(
        petitions: Arc<dyn PetitionRepository>,
        event_writer: Option<Arc<dyn EventWriter>>,
        orchestrator: Arc<dyn DeliberationOrchestrator>,
        halt_gate: Arc<dyn HaltGate>,
        threshold_hours: u32,
    ) -> Self {
        Self {
            petitions,
            event_writer,
            orchestrator,
            halt_gate,
            threshold_hours,
        }
    }

    /// Scan for orphans. A read; works during halt.
    ///
    /// Emits `petition.monitoring.orphans_detected` only when orphans are
    /// found; emission failures are logged, the scan result stands.
    pub async fn detect_orphans(&self) -> Result<OrphanDetectionResult> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::hours(i64::from(self.threshold_hours));

        tracing::info!(
            threshold_hours = self.threshold_hours,
            cutoff = %cutoff,
            "orphan detection started",
        );

        let stuck = self
            .petitions
            .find_by_state(PetitionState::Received, Some(cutoff))
            .await?;

        let orphans: Vec<OrphanInfo> = stuck
            .into_iter()
            .map(|p| OrphanInfo {
                petition_id: p.id,
                petition_type: p.petition_type,
                created_at: p.created_at,
                age_hours: (now - p.created_at).num_seconds() as f64 / 3600.0,
                co_signer_count: p.co_signer_count,
            })
            .collect();

        let result = OrphanDetectionResult {
            detected_at: now,
            threshold_hours: self.threshold_hours,
            orphans,
        };

        tracing::info!(
            orphan_count = result.total(),
            oldest_age_hours = result.oldest_age_hours(),
            "orphan detection completed",
        );

        if result.total() > 0 {
            if let Some(writer) = self.event_writer.as_ref() {
                let event = OrphansDetectedEvent {
                    detected_at: result.detected_at,
                    orphan_count: result.total(),
                    orphan_petition_ids: result.petition_ids(),
                    oldest_orphan_age_hours: result.oldest_age_hours(),
                    detection_threshold_hours: result.threshold_hours,
                };
                match event.payload() {
                    Ok(payload) => {
                        if let Err(err) = writer.write(event_types::ORPHANS_DETECTED, payload).await
                        {
                            tracing::warn!(error = %err, "orphan detection event emission failed");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "event payload build failed");
                    }
                }
            }
        }

        Ok(result)
    }

    /// Manually push orphans back into deliberation.
    ///
    /// Returns the partition of ids into `success` and `failed`; ids that
    /// are missing or no longer RECEIVED land in `failed` without
    /// aborting the rest.
    pub async fn reprocess(
        &self,
        petition_ids: Vec<PetitionId>,
        triggered_by: &str,
        reason: &str,
    ) -> Result<ReprocessResult> {
        // HALT CHECK FIRST: reprocessing initiates deliberation writes.
        ensure_not_halted(self.halt_gate.as_ref()).await?;

        if petition_ids.is_empty() {
            return Err(FatesError::validation(
                "petition_ids",
                "petition_ids cannot be empty",
            ));
        }

        tracing::info!(
            petition_count = petition_ids.len(),
            triggered_by,
            reason,
            "manual orphan reprocessing started",
        );

        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for petition_id in petition_ids {
            match self.petitions.get(petition_id).await? {
                Some(p) if p.state == PetitionState::Received => valid.push(petition_id),
                Some(p) => {
                    tracing::warn!(
                        petition_id = %petition_id,
                        current_state = %p.state,
                        "petition not in RECEIVED state, skipping reprocessing",
                    );
                    invalid.push(petition_id);
                }
                None => {
                    tracing::warn!(petition_id = %petition_id, "petition not found for reprocessing");
                    invalid.push(petition_id);
                }
            }
        }

        // One witnessed event per call, covering every valid id.
        if !valid.is_empty() {
            if let Some(writer) = self.event_writer.as_ref() {
                let event = ReprocessingTriggeredEvent {
                    petition_ids: valid.clone(),
                    triggered_by: triggered_by.to_string(),
                    reason: reason.to_string(),
                    triggered_at: Utc::now(),
                };
                match event.payload() {
                    Ok(payload) => {
                        if let Err(err) = writer
                            .write(event_types::REPROCESSING_TRIGGERED, payload)
                            .await
                        {
                            tracing::warn!(error = %err, "reprocessing event emission failed");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "event payload build failed");
                    }
                }
            }
        }

        let mut success = Vec::new();
        let mut failed = invalid;
        for petition_id in valid {
            match self.orchestrator.initiate_deliberation(petition_id).await {
                Ok(()) => {
                    tracing::info!(petition_id = %petition_id, "deliberation initiated for orphan");
                    success.push(petition_id);
                }
                Err(err) => {
                    tracing::error!(
                        petition_id = %petition_id,
                        error = %err,
                        "failed to initiate deliberation for orphan",
                    );
                    failed.push(petition_id);
                }
            }
        }

        tracing::info!(
            success_count = success.len(),
            failed_count = failed.len(),
            "orphan reprocessing completed",
        );
        Ok(ReprocessResult { success, failed })
    }

    /// Spawn the periodic detection task.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = self.detect_orphans().await {
                    tracing::error!(error = %err, "orphan detection pass failed");
                }
            }
        })
    }
}
