//! Three Fates Crypto - Content hashing and witness digests
//!
//! All petition content and witness hashing uses blake3 (256-bit output).
//! There is no keyed state and no secrets: the digests exist so an external
//! observer can re-derive and verify them.
//!
//! # Invariants
//!
//! 1. Hashing the same text twice yields identical 32-byte output
//! 2. Digest comparison in `verify` is constant-time
//! 3. Witness content strings are deterministic for a given record

use chrono::{DateTime, Utc};

use fates_types::{
    AcknowledgmentId, ArchonId, KingId, PetitionId, ReasonCode, ReferralId, FatesError, Result,
    EVENT_SCHEMA_VERSION,
};

/// Size of a content hash in bytes (blake3, 256-bit)
pub const HASH_SIZE: usize = 32;

/// Deterministic content hasher over petition text and witness content.
///
/// Stateless; cheap to construct and clone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash arbitrary bytes to a 32-byte digest.
    pub fn hash(&self, content: &[u8]) -> [u8; HASH_SIZE] {
        *blake3::hash(content).as_bytes()
    }

    /// Hash a string by encoding it as UTF-8 first.
    pub fn hash_text(&self, text: &str) -> [u8; HASH_SIZE] {
        self.hash(text.as_bytes())
    }

    /// Verify `content` against an expected digest.
    ///
    /// The comparison is constant-time (`blake3::Hash` equality). Fails
    /// if `expected` is not exactly 32 bytes.
    pub fn verify(&self, content: &[u8], expected: &[u8]) -> Result<bool> {
        let expected: [u8; HASH_SIZE] = expected.try_into().map_err(|_| {
            FatesError::validation(
                "expected",
                format!("expected digest must be {HASH_SIZE} bytes, got {}", expected.len()),
            )
        })?;
        Ok(blake3::hash(content) == blake3::Hash::from_bytes(expected))
    }
}

/// Render a digest in the canonical `blake3:<hex>` witness form.
pub fn format_witness_hash(digest: &[u8; HASH_SIZE]) -> String {
    format!("blake3:{}", hex::encode(digest))
}

// ============================================================================
// Witness Content Builders
// ============================================================================
//
// Each fate record carries a witness hash over a deterministic `|`-joined
// string of its fields, so the record can be verified without replaying
// the operation that created it.

/// Canonical witness content for a Marquis acknowledgment.
///
/// Archon seats are sorted so the content does not depend on vote order.
pub fn marquis_witness_content(
    acknowledgment_id: AcknowledgmentId,
    petition_id: PetitionId,
    reason_code: ReasonCode,
    archon_ids: &[ArchonId],
    acknowledged_at: DateTime<Utc>,
    rationale: Option<&str>,
    reference_petition_id: Option<PetitionId>,
) -> String {
    let mut sorted: Vec<u32> = archon_ids.iter().map(|a| a.0).collect();
    sorted.sort_unstable();
    let archons = sorted
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut parts = vec![
        format!("acknowledgment_id:{acknowledgment_id}"),
        format!("petition_id:{petition_id}"),
        format!("reason_code:{reason_code}"),
        format!("archons:{archons}"),
        format!("acknowledged_at:{}", acknowledged_at.to_rfc3339()),
        format!("schema_version:{EVENT_SCHEMA_VERSION}"),
    ];
    if let Some(rationale) = rationale {
        parts.push(format!("rationale:{rationale}"));
    }
    if let Some(reference) = reference_petition_id {
        parts.push(format!("reference_petition_id:{reference}"));
    }
    parts.join("|")
}

/// Canonical witness content for a King acknowledgment.
pub fn king_witness_content(
    acknowledgment_id: AcknowledgmentId,
    petition_id: PetitionId,
    king_id: KingId,
    reason_code: ReasonCode,
    acknowledged_at: DateTime<Utc>,
    realm_id: &str,
    rationale: Option<&str>,
) -> String {
    let mut parts = vec![
        format!("acknowledgment_id:{acknowledgment_id}"),
        format!("petition_id:{petition_id}"),
        format!("king_id:{king_id}"),
        format!("reason_code:{reason_code}"),
        format!("acknowledged_at:{}", acknowledged_at.to_rfc3339()),
        format!("realm_id:{realm_id}"),
        format!("schema_version:{EVENT_SCHEMA_VERSION}"),
    ];
    if let Some(rationale) = rationale {
        parts.push(format!("rationale:{rationale}"));
    }
    parts.join("|")
}

/// Canonical witness content for a referral.
pub fn referral_witness_content(
    referral_id: ReferralId,
    petition_id: PetitionId,
    realm_id: &str,
    deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
) -> String {
    [
        format!("referral_id:{referral_id}"),
        format!("petition_id:{petition_id}"),
        format!("realm_id:{realm_id}"),
        format!("deadline:{}", deadline.to_rfc3339()),
        format!("created_at:{}", created_at.to_rfc3339()),
        format!("schema_version:{EVENT_SCHEMA_VERSION}"),
    ]
    .join("|")
}
