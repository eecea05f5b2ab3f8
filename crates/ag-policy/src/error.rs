// error.rs — Error types for policy validation.

use thiserror::Error;

/// Errors raised while validating a policy rule before it is stored.
///
/// Evaluation itself never errors: malformed patterns and unparseable
/// condition bounds fail closed (the rule simply does not match).
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A glob pattern did not parse.
    #[error("invalid pattern '{0}'")]
    InvalidPattern(String),

    /// A time bound was not of the form "HH:MM".
    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    /// A day-of-week name was not recognized.
    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),

    /// An action string normalized to nothing.
    #[error("action must not be empty")]
    EmptyAction,
}
