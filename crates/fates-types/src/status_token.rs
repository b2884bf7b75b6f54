//! Status token for long-poll change detection
//!
//! A status token is a derived version over `(content_hash, state)`. It is
//! never persisted; observers compare versions to detect fate changes
//! without fetching the full petition.

use serde::{Deserialize, Serialize};

use crate::petition::PetitionState;

/// Derived petition version for long-poll change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusToken(pub u64);

impl StatusToken {
    /// Compute the version for a petition's current `(content_hash, state)`.
    ///
    /// FNV-1a over the hash bytes and the state discriminant: deterministic
    /// across processes and restarts, which a hasher with per-process keys
    /// would not be.
    pub fn compute(content_hash: Option<&[u8; 32]>, state: PetitionState) -> Self {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut acc = FNV_OFFSET;
        if let Some(hash) = content_hash {
            for byte in hash {
                acc ^= u64::from(*byte);
                acc = acc.wrapping_mul(FNV_PRIME);
            }
        }
        for byte in state.as_str().as_bytes() {
            acc ^= u64::from(*byte);
            acc = acc.wrapping_mul(FNV_PRIME);
        }
        Self(acc)
    }
}
