//! # ag-store
//!
//! Entity records and the storage seam for AgentGuard.
//!
//! The decision engine and the HTTP handlers never touch a database
//! directly; everything goes through the [`GuardStore`] trait, which
//! models a transactional keyed store with the handful of indexed
//! lookups the control plane needs — agent by id, credential by secret
//! digest, policy by agent or team, revocation by jti, approvals
//! filtered, and the one non-trivial primitive: "append an audit entry
//! for an agent with chain linkage", which the implementation must make
//! atomic per agent.
//!
//! [`MemoryStore`] is the bundled single-node realization. A SQL-backed
//! realization implements the same trait with a row lock (plus a unique
//! `(agent_id, prev_log_id)` constraint as a backstop) in place of the
//! in-process per-agent mutex.

pub mod dal;
pub mod entities;
pub mod error;
pub mod memory;

pub use dal::{AgentFilter, ApprovalPage, ApprovalQuery, AuditQuery, GuardStore};
pub use entities::{
    new_admin_id, new_agent_id, new_approval_id, AdminUser, Agent, AgentCredential,
    ApprovalRequest, ApprovalStatus, Environment, RevokedToken,
};
pub use error::StoreError;
pub use memory::MemoryStore;
