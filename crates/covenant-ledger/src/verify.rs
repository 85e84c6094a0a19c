//! Chain integrity verification.

use serde::Serialize;

use crate::entry::LedgerEntry;

/// Result of walking a chain segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub intact: bool,
    /// Entries examined.
    pub total_entries: u64,
    /// Entries that passed before the first break.
    pub verified_entries: u64,
    /// Sequence of the first entry that fails, if any.
    pub first_break: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChainVerification {
    fn intact(total: u64) -> Self {
        Self {
            intact: true,
            total_entries: total,
            verified_entries: total,
            first_break: None,
            reason: None,
        }
    }

    fn broken(total: u64, verified: u64, sequence: u64, reason: String) -> Self {
        Self {
            intact: false,
            total_entries: total,
            verified_entries: verified,
            first_break: Some(sequence),
            reason: Some(reason),
        }
    }
}

/// Verify `entries` (ascending) against an optional predecessor.
///
/// Without an anchor the segment must start at the genesis entry. Each entry
/// is checked for contiguous sequence, a previous hash equal to the
/// predecessor's record hash, and a record hash equal to the recomputed one.
pub fn verify_entries(entries: &[LedgerEntry], anchor: Option<&LedgerEntry>) -> ChainVerification {
    let total = entries.len() as u64;
    let (mut expected_sequence, mut expected_previous) = match anchor {
        Some(anchor) => (anchor.sequence + 1, anchor.record_hash.clone()),
        None => (1, String::new()),
    };

    for (verified, entry) in entries.iter().enumerate() {
        let verified = verified as u64;

        if entry.sequence != expected_sequence {
            return ChainVerification::broken(
                total,
                verified,
                expected_sequence,
                format!(
                    "sequence gap: expected {}, found {}",
                    expected_sequence, entry.sequence
                ),
            );
        }

        if entry.compute_hash() != entry.record_hash {
            return ChainVerification::broken(
                total,
                verified,
                entry.sequence,
                format!("entry {} has been modified since it was written", entry.id),
            );
        }

        if entry.previous_hash != expected_previous {
            return ChainVerification::broken(
                total,
                verified,
                entry.sequence,
                format!(
                    "entry {} does not link to its predecessor (expected '{}', found '{}')",
                    entry.id, expected_previous, entry.previous_hash
                ),
            );
        }

        expected_sequence += 1;
        expected_previous = entry.record_hash.clone();
    }

    ChainVerification::intact(total)
}
