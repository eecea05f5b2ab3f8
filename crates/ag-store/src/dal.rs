// dal.rs — The GuardStore trait: everything the control plane asks of storage.
//
// Implementations must make each method transactional on its own, and
// append_audit atomic PER AGENT: read-latest and insert must not
// interleave for the same agent or the hash chain forks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ag_audit::{AuditEntry, AuditResult};
use ag_policy::{AgentPolicy, TeamPolicy};

use crate::entities::{
    AdminUser, Agent, AgentCredential, ApprovalRequest, ApprovalStatus, RevokedToken,
};
use crate::error::StoreError;

/// Filters for listing agents.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub team: Option<String>,
    pub include_inactive: bool,
}

/// Filters for querying audit entries. Results are newest-first.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub agent_id: Option<String>,
    pub result: Option<AuditResult>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            agent_id: None,
            result: None,
            since: None,
            until: None,
            limit: 100,
        }
    }
}

/// Filters for listing approval requests. Results are newest-first.
#[derive(Debug, Clone)]
pub struct ApprovalQuery {
    pub status: Option<ApprovalStatus>,
    pub agent_id: Option<String>,
    pub limit: usize,
}

impl Default for ApprovalQuery {
    fn default() -> Self {
        Self {
            status: None,
            agent_id: None,
            limit: 50,
        }
    }
}

/// A page of approvals plus the global pending counter.
#[derive(Debug, Clone)]
pub struct ApprovalPage {
    pub approvals: Vec<ApprovalRequest>,
    pub pending_count: usize,
}

/// The storage seam. See the crate docs for the transactional contract.
#[async_trait]
pub trait GuardStore: Send + Sync {
    // ── Agents & credentials ─────────────────────────────────────

    /// Insert an agent together with its first credential.
    async fn create_agent(
        &self,
        agent: Agent,
        credential: AgentCredential,
    ) -> Result<(), StoreError>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError>;

    async fn list_agents(&self, filter: AgentFilter) -> Result<Vec<Agent>, StoreError>;

    /// Soft-deactivate: flips is_active on the agent and every credential.
    /// Policy and audit are retained. Returns the updated record.
    async fn deactivate_agent(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Agent, StoreError>;

    /// Look up the agent owning an ACTIVE credential with this digest.
    async fn find_agent_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<Agent>, StoreError>;

    // ── Admin users ──────────────────────────────────────────────

    async fn insert_admin(&self, admin: AdminUser) -> Result<(), StoreError>;

    async fn get_admin(&self, admin_id: &str) -> Result<Option<AdminUser>, StoreError>;

    async fn find_admin_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<AdminUser>, StoreError>;

    // ── Policies ─────────────────────────────────────────────────

    /// Upsert the agent's policy (exactly one per agent).
    async fn put_agent_policy(&self, policy: AgentPolicy) -> Result<(), StoreError>;

    async fn get_agent_policy(&self, agent_id: &str)
        -> Result<Option<AgentPolicy>, StoreError>;

    /// Upsert the team policy (exactly one per team name).
    async fn put_team_policy(&self, policy: TeamPolicy) -> Result<(), StoreError>;

    async fn get_team_policy(&self, team: &str) -> Result<Option<TeamPolicy>, StoreError>;

    // ── Approvals ────────────────────────────────────────────────

    async fn insert_approval(&self, approval: ApprovalRequest) -> Result<(), StoreError>;

    async fn get_approval(
        &self,
        approval_id: &str,
    ) -> Result<Option<ApprovalRequest>, StoreError>;

    /// Persist a decision atomically. Fails with [`StoreError::AlreadyDecided`]
    /// when the request is terminal, [`StoreError::NotFound`] when absent.
    async fn decide_approval(
        &self,
        approval_id: &str,
        status: ApprovalStatus,
        decided_by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, StoreError>;

    async fn list_approvals(&self, query: ApprovalQuery) -> Result<ApprovalPage, StoreError>;

    // ── Audit chain ──────────────────────────────────────────────

    /// Append an entry to the agent's chain. The entry arrives unlinked;
    /// the store fills prev_log_id and chain_hash under the agent's write
    /// serializer and returns the linked entry.
    async fn append_audit(&self, entry: AuditEntry) -> Result<AuditEntry, StoreError>;

    /// The agent's full chain in append order (oldest first).
    async fn audit_chain(&self, agent_id: &str) -> Result<Vec<AuditEntry>, StoreError>;

    /// Filtered query across entries, newest first.
    async fn query_audit(&self, query: AuditQuery) -> Result<Vec<AuditEntry>, StoreError>;

    // ── Revocation set ───────────────────────────────────────────

    /// Record a revoked jti. Idempotent.
    async fn revoke_token(&self, token: RevokedToken) -> Result<(), StoreError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError>;

    /// Delete rows whose natural expiry precedes the cutoff. Returns the
    /// number removed. Never removes a row that has not expired.
    async fn sweep_revocations(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    // ── Health ───────────────────────────────────────────────────

    /// Cheap readiness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
