// error.rs — Storage failure taxonomy.

use thiserror::Error;

/// Errors surfaced by [`crate::GuardStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity with the same key already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The approval has already reached a terminal status.
    #[error("approval already decided")]
    AlreadyDecided,

    /// The backing store could not be reached or failed mid-operation.
    /// The engine maps this to its safe default (deny).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
