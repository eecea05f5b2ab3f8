//! # ag-policy
//!
//! Policy rule model and evaluation primitives for AgentGuard.
//!
//! Implements the "default deny" security boundary: an agent may only perform
//! actions that a rule in its effective policy explicitly allows. Rules are
//! matched against a normalized `verb:noun` action, a glob resource pattern,
//! and optional runtime conditions (environment, time-of-day, weekday).
//!
//! This crate is deliberately pure: no clock reads, no I/O. The caller
//! supplies the current UTC time through [`RuntimeContext`], which keeps
//! evaluation deterministic and testable.

pub mod conditions;
pub mod error;
pub mod normalize;
pub mod rule;

pub use conditions::{RuleConditions, RuntimeContext, TimeRange};
pub use error::PolicyError;
pub use normalize::{matches_pattern, normalize_action};
pub use rule::{first_match, rule_matches, AgentPolicy, PolicyRule, RuleMatch, TeamPolicy};
