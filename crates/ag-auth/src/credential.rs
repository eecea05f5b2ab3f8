// credential.rs — API secret generation and hashing.
//
// Secrets are high-entropy random strings handed to the caller exactly
// once at creation. Only the SHA-256 digest is stored, which doubles as
// the lookup index for key exchange. The first 8 characters are kept in
// the clear for operator diagnostics ("which key was that again?").

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix for agent API keys.
pub const AGENT_KEY_PREFIX: &str = "agk_";
/// Prefix for admin API keys.
pub const ADMIN_KEY_PREFIX: &str = "adk_";

const SECRET_LEN: usize = 40;

/// Generate a fresh secret: `<prefix>` + 40 alphanumeric characters.
pub fn generate_secret(prefix: &str) -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, body)
}

/// SHA-256 digest of a secret, lowercase hex. This is what gets stored.
pub fn secret_hash(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// The diagnostic prefix retained alongside the digest.
pub fn secret_prefix(secret: &str) -> String {
    secret.chars().take(8).collect()
}

/// Constant-time string comparison for static-key checks.
///
/// Length is compared first; the byte walk never early-exits.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
