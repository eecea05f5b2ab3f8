// error.rs — Authentication failure taxonomy.
//
// The HTTP surface collapses every token failure into one uniform 401
// body; these variants exist so the gate can log the concrete reason
// before collapsing.

use thiserror::Error;

/// Why a token operation failed.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed token or bad signature.
    #[error("token signature or format invalid")]
    InvalidToken,

    /// The token's expiry is in the past.
    #[error("token expired")]
    Expired,

    /// Key material could not be loaded or generated.
    #[error("signing key error: {0}")]
    Key(String),

    /// Signing a token failed.
    #[error("token signing error: {0}")]
    Signing(String),
}
