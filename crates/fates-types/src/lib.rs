//! Three Fates Types - Canonical domain types for petition governance
//!
//! This crate contains all foundational types for the Three Fates petition
//! engine with zero dependencies on other fates crates. It defines:
//!
//! - Identity types (PetitionId, KingId, ReferralId, etc.)
//! - The petition lifecycle state machine and its transition matrix
//! - Acknowledgment reason codes and the Acknowledgment record
//! - Referral records with cycle-based deadlines
//! - The shared error taxonomy for every fates crate
//!
//! # Architectural Invariants
//!
//! 1. Every petition terminates in exactly one of the Five Fates
//! 2. Terminal petitions are immutable
//! 3. State transitions only follow the transition matrix
//! 4. Every fate is paired with a witnessed ledger event

pub mod acknowledgment;
pub mod error;
pub mod identity;
pub mod notification;
pub mod petition;
pub mod referral;
pub mod status_token;

pub use acknowledgment::*;
pub use error::*;
pub use identity::*;
pub use notification::*;
pub use petition::*;
pub use referral::*;
pub use status_token::*;

/// Schema version carried by every event payload
pub const EVENT_SCHEMA_VERSION: u32 = 1;
