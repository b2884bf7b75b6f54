//! Error taxonomy for the Three Fates engine
//!
//! Every crate in the workspace speaks this taxonomy. Validation errors
//! fail fast and surface unchanged; CAS and halt errors are correctness
//! signals and are never retried; event-emission failures trigger exactly
//! one rollback and then surface.

use thiserror::Error;

use crate::identity::{AcknowledgmentId, MotionId, PetitionId, ReferralId, SignerId};
use crate::petition::PetitionState;

/// Result type for Three Fates operations
pub type Result<T> = std::result::Result<T, FatesError>;

/// Three Fates error types
#[derive(Debug, Error)]
pub enum FatesError {
    // ========================================================================
    // Halt Errors
    // ========================================================================

    /// Write refused because the halt gate is active
    #[error("System halted: {reason}")]
    SystemHalted { reason: String },

    // ========================================================================
    // Lookup Errors
    // ========================================================================

    /// Petition does not exist
    #[error("Petition {petition_id} not found")]
    PetitionNotFound { petition_id: PetitionId },

    /// Referral does not exist
    #[error("Referral {referral_id} not found")]
    ReferralNotFound { referral_id: ReferralId },

    /// Acknowledgment does not exist
    #[error("Acknowledgment {acknowledgment_id} not found")]
    AcknowledgmentNotFound { acknowledgment_id: AcknowledgmentId },

    // ========================================================================
    // State Machine Errors
    // ========================================================================

    /// Off-matrix transition attempt
    #[error("Invalid state transition {from} -> {to}; allowed targets: {allowed:?}")]
    InvalidStateTransition {
        from: PetitionState,
        to: PetitionState,
        allowed: Vec<PetitionState>,
    },

    /// Write against a petition that already reached one of the Five Fates
    #[error("Petition {petition_id} already fated: {terminal_state}")]
    AlreadyFated {
        petition_id: PetitionId,
        terminal_state: PetitionState,
    },

    /// CAS observed a state other than the expected one
    #[error(
        "Concurrent modification of petition {petition_id}: expected {expected}, found {actual}; re-read and retry"
    )]
    ConcurrentModification {
        petition_id: PetitionId,
        expected: PetitionState,
        actual: PetitionState,
    },

    // ========================================================================
    // Fate Execution Errors
    // ========================================================================

    /// An acknowledgment already exists for this petition
    #[error("Petition {petition_id} already acknowledged by {acknowledgment_id}")]
    AcknowledgmentAlreadyExists {
        petition_id: PetitionId,
        acknowledgment_id: AcknowledgmentId,
    },

    /// Minimum dwell time in DELIBERATING has not elapsed
    #[error("Dwell time not elapsed for petition {petition_id}: {remaining_seconds}s remaining")]
    DwellTimeNotElapsed {
        petition_id: PetitionId,
        remaining_seconds: u64,
    },

    /// King acting on a petition escalated to a different realm
    #[error("Realm mismatch: petition escalated to '{expected}', actor is scoped to '{actual}'")]
    RealmMismatch { expected: String, actual: String },

    /// Operation requires an ESCALATED petition
    #[error("Petition {petition_id} is not escalated (current state: {current_state})")]
    NotEscalated {
        petition_id: PetitionId,
        current_state: PetitionState,
    },

    /// Adoption triple is write-once
    #[error("Petition {petition_id} already adopted as motion {motion_id}")]
    AlreadyAdopted {
        petition_id: PetitionId,
        motion_id: MotionId,
    },

    /// Signer already co-signed this petition
    #[error("Signer {signer_id} already co-signed petition {petition_id}")]
    DuplicateCoSigner {
        petition_id: PetitionId,
        signer_id: SignerId,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Input validation failure (text length, rationale, archon count, limit...)
    #[error("Invalid input: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// Malformed keyset pagination cursor
    #[error("Invalid cursor: {reason}")]
    InvalidCursor { reason: String },

    // ========================================================================
    // Authorization Errors
    // ========================================================================

    /// Actor is not permitted to perform the operation
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================

    /// Fate event emission failed; the state change was rolled back
    #[error("Fate event emission failed for petition {petition_id}; state rolled back to {rolled_back_to}")]
    FateEventEmissionFailed {
        petition_id: PetitionId,
        rolled_back_to: PetitionState,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Repository / scheduler / ledger I/O error; retryable within budget
    #[error("Transient failure: {message}")]
    Transient { message: String },

    /// Fatal misconfiguration, refused at startup where possible
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unclassified internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FatesError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error may succeed on retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::FateEventEmissionFailed { .. }
        )
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SystemHalted { .. } => "SYSTEM_HALTED",
            Self::PetitionNotFound { .. } => "PETITION_NOT_FOUND",
            Self::ReferralNotFound { .. } => "REFERRAL_NOT_FOUND",
            Self::AcknowledgmentNotFound { .. } => "ACKNOWLEDGMENT_NOT_FOUND",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::AlreadyFated { .. } => "ALREADY_FATED",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::AcknowledgmentAlreadyExists { .. } => "ACKNOWLEDGMENT_ALREADY_EXISTS",
            Self::DwellTimeNotElapsed { .. } => "DWELL_TIME_NOT_ELAPSED",
            Self::RealmMismatch { .. } => "REALM_MISMATCH",
            Self::NotEscalated { .. } => "NOT_ESCALATED",
            Self::AlreadyAdopted { .. } => "ALREADY_ADOPTED",
            Self::DuplicateCoSigner { .. } => "DUPLICATE_CO_SIGNER",
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::InvalidCursor { .. } => "INVALID_CURSOR",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::FateEventEmissionFailed { .. } => "FATE_EVENT_EMISSION_FAILED",
            Self::Transient { .. } => "TRANSIENT_FAILURE",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
