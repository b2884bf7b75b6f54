//! Engine configuration with environment overrides
//!
//! Every knob has a default and a clamp range, so a bad environment value
//! degrades to something sane instead of refusing to boot:
//!
//! - `MIN_DWELL_TIME_SECONDS`: default 30, clamped to [0, 300]
//! - `DELIBERATION_TIMEOUT_SECONDS`: default 300, clamped to [60, 900]
//! - `MAX_DELIBERATION_ROUNDS`: default 3, clamped to [1, 10]
//! - `CESSATION_ESCALATION_THRESHOLD`: default 100
//! - `GRIEVANCE_ESCALATION_THRESHOLD`: default 50
//! - `ORPHAN_THRESHOLD_HOURS`: default 24

use serde::{Deserialize, Serialize};

/// Minimum dwell time default (seconds)
pub const DEFAULT_MIN_DWELL_SECONDS: u64 = 30;
/// Deliberation timeout default (seconds)
pub const DEFAULT_DELIBERATION_TIMEOUT_SECONDS: u64 = 300;
/// Maximum deliberation rounds before deadlock escalation
pub const DEFAULT_MAX_DELIBERATION_ROUNDS: u32 = 3;
/// CESSATION co-signer escalation threshold (immutable default)
pub const DEFAULT_CESSATION_THRESHOLD: u32 = 100;
/// GRIEVANCE co-signer escalation threshold
pub const DEFAULT_GRIEVANCE_THRESHOLD: u32 = 50;
/// Hours in RECEIVED before a petition counts as orphaned
pub const DEFAULT_ORPHAN_THRESHOLD_HOURS: u32 = 24;

/// Tunable engine parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum time a petition spends in DELIBERATING before it may be
    /// acknowledged. Zero disables the check.
    pub min_dwell_seconds: u64,
    /// Deliberation timeout before auto-escalation
    pub deliberation_timeout_seconds: u64,
    /// Voting rounds before deadlock escalation
    pub max_deliberation_rounds: u32,
    /// CESSATION co-signer threshold
    pub cessation_threshold: u32,
    /// GRIEVANCE co-signer threshold
    pub grievance_threshold: u32,
    /// RECEIVED staleness threshold for the orphan monitor
    pub orphan_threshold_hours: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_dwell_seconds: DEFAULT_MIN_DWELL_SECONDS,
            deliberation_timeout_seconds: DEFAULT_DELIBERATION_TIMEOUT_SECONDS,
            max_deliberation_rounds: DEFAULT_MAX_DELIBERATION_ROUNDS,
            cessation_threshold: DEFAULT_CESSATION_THRESHOLD,
            grievance_threshold: DEFAULT_GRIEVANCE_THRESHOLD,
            orphan_threshold_hours: DEFAULT_ORPHAN_THRESHOLD_HOURS,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment, clamping every value to its
    /// allowed range. Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self {
            min_dwell_seconds: env_u64("MIN_DWELL_TIME_SECONDS", DEFAULT_MIN_DWELL_SECONDS)
                .clamp(0, 300),
            deliberation_timeout_seconds: env_u64(
                "DELIBERATION_TIMEOUT_SECONDS",
                DEFAULT_DELIBERATION_TIMEOUT_SECONDS,
            )
            .clamp(60, 900),
            max_deliberation_rounds: env_u32(
                "MAX_DELIBERATION_ROUNDS",
                DEFAULT_MAX_DELIBERATION_ROUNDS,
            )
            .clamp(1, 10),
            cessation_threshold: env_u32(
                "CESSATION_ESCALATION_THRESHOLD",
                DEFAULT_CESSATION_THRESHOLD,
            ),
            grievance_threshold: env_u32(
                "GRIEVANCE_ESCALATION_THRESHOLD",
                DEFAULT_GRIEVANCE_THRESHOLD,
            ),
            orphan_threshold_hours: env_u32(
                "ORPHAN_THRESHOLD_HOURS",
                DEFAULT_ORPHAN_THRESHOLD_HOURS,
            ),
        }
    }

    /// Dwell enforcement is skipped entirely when configured to zero.
    pub fn dwell_enabled(&self) -> bool {
        self.min_dwell_seconds > 0
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
