// hasher.rs — SHA-256 digests for chain links.
//
// A chain link digests "<predecessor hash>|<canonical entry JSON>" into
// 64 lowercase hex characters. Hex keeps the hashes readable in log
// exports and comparable with shell tooling.

use sha2::{Digest, Sha256};

/// Digest a UTF-8 string to a lowercase hex SHA-256 string.
pub fn hash_str(s: &str) -> String {
    format!("{:x}", Sha256::digest(s.as_bytes()))
}
