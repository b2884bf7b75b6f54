//! Shared application state for the API layer

use std::sync::Arc;

use fates_engine::{
    AcknowledgmentExecutor, CoSignService, DecisionPackageService, EscalationQueueService,
    HaltGate, SubmissionService,
};

/// Services the handlers dispatch into
pub struct AppState {
    pub submission: SubmissionService,
    pub cosign: CoSignService,
    pub acknowledgments: AcknowledgmentExecutor,
    pub queue: EscalationQueueService,
    pub packages: DecisionPackageService,
    pub halt_gate: Arc<dyn HaltGate>,
}
