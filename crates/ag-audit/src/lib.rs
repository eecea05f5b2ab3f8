//! # ag-audit
//!
//! Tamper-evident audit records for AgentGuard.
//!
//! Every enforcement decision and agent-submitted log line becomes an
//! [`AuditEntry`]. Entries for one agent form a hash chain: each entry
//! stores the id of its predecessor and a SHA-256 over the predecessor's
//! chain hash plus its own canonical serialization. Editing, inserting,
//! or deleting any past entry breaks every later link, which
//! [`chain::verify_entries`] detects and pinpoints.
//!
//! This crate owns the entry model, the canonical serialization, and the
//! chain arithmetic. Persistence and the per-agent write serializer live
//! in the storage layer.

pub mod chain;
pub mod entry;
pub mod hasher;

pub use chain::{compute_chain_hash, link_entry, verify_entries, ChainVerification};
pub use entry::{AuditEntry, AuditResult};
