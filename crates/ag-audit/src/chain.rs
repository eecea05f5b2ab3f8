// chain.rs — Hash-chain linkage and verification.
//
// chain_hash = SHA-256( (prev_chain_hash or "") ‖ "|" ‖ canonical(entry) )
//
// The first entry of an agent has prev_log_id = None and hashes with an
// empty predecessor hash. Verification walks the stored order, checks
// each entry's prev_log_id against its predecessor, and recomputes the
// hash from the predecessor's STORED chain hash — so the first entry
// whose bytes were altered is the one reported, not a later echo.

use uuid::Uuid;

use crate::entry::AuditEntry;
use crate::hasher;

/// Result of verifying one agent's chain.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub total_entries: usize,
    /// The first entry that fails recomputation, when invalid.
    pub broken_at: Option<Uuid>,
}

impl ChainVerification {
    fn ok(total_entries: usize) -> Self {
        Self {
            valid: true,
            total_entries,
            broken_at: None,
        }
    }

    fn broken(total_entries: usize, log_id: Uuid) -> Self {
        Self {
            valid: false,
            total_entries,
            broken_at: Some(log_id),
        }
    }
}

/// Compute the chain hash for an entry given its predecessor's hash.
pub fn compute_chain_hash(prev_chain_hash: Option<&str>, entry: &AuditEntry) -> String {
    hasher::hash_str(&format!(
        "{}|{}",
        prev_chain_hash.unwrap_or(""),
        entry.canonical_serialize()
    ))
}

/// Link an entry to its predecessor, filling prev_log_id and chain_hash.
///
/// `prev` is the latest stored entry for the agent, or None for the first
/// link. The caller must hold the agent's write serializer: linking
/// against a stale predecessor forks the chain.
pub fn link_entry(entry: &mut AuditEntry, prev: Option<(Uuid, &str)>) {
    entry.prev_log_id = prev.map(|(log_id, _)| log_id);
    entry.chain_hash = compute_chain_hash(prev.map(|(_, hash)| hash), entry);
}

/// Walk a chain in stored order and verify every link.
///
/// An empty chain is valid. On the first mismatch — broken predecessor
/// linkage or a chain hash that does not recompute — the walk stops and
/// reports that entry's log_id.
pub fn verify_entries(entries: &[AuditEntry]) -> ChainVerification {
    let mut prev: Option<(&Uuid, &str)> = None;

    for entry in entries {
        let expected_prev = prev.map(|(id, _)| *id);
        if entry.prev_log_id != expected_prev {
            return ChainVerification::broken(entries.len(), entry.log_id);
        }
        let recomputed = compute_chain_hash(prev.map(|(_, hash)| hash), entry);
        if recomputed != entry.chain_hash {
            return ChainVerification::broken(entries.len(), entry.log_id);
        }
        prev = Some((&entry.log_id, entry.chain_hash.as_str()));
    }

    ChainVerification::ok(entries.len())
}
