//! Identity types for the Three Fates engine
//!
//! All identity types are strongly typed wrappers around UUIDs to prevent
//! accidental mixing of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

// Petition lifecycle identity types
define_id_type!(PetitionId, "petition", "Unique identifier for a petition");
define_id_type!(SubmitterId, "submitter", "Identity of a petition submitter");
define_id_type!(SignerId, "signer", "Identity of a petition co-signer");

// Fate execution identity types
define_id_type!(AcknowledgmentId, "ack", "Unique identifier for an acknowledgment record");
define_id_type!(ReferralId, "referral", "Unique identifier for a referral record");
define_id_type!(EscalationId, "escalation", "Unique identifier for an escalation");
define_id_type!(MotionId, "motion", "Unique identifier for a Motion adopted from a petition");

// Authority identity types
define_id_type!(KingId, "king", "Unique identifier for a King");

// Infrastructure identity types
define_id_type!(SessionId, "session", "Unique identifier for a deliberation session");
define_id_type!(EventId, "event", "Unique identifier for a ledger event");
define_id_type!(JobId, "job", "Unique identifier for a scheduled job");

/// Seat number of an Archon in the Marquis collective.
///
/// Archons are numbered seats, not UUID identities; two out of three
/// seats form the acknowledgment supermajority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchonId(pub u32);

impl fmt::Display for ArchonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ArchonId {
    fn from(seat: u32) -> Self {
        Self(seat)
    }
}
