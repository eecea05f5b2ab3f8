// memory.rs — In-memory reference implementation of GuardStore.
//
// Tables are plain HashMaps behind one RwLock; every method takes and
// releases a lock within the call, nothing is held across an await.
// The audit append path additionally serializes per agent: the agent's
// mutex is held across read-latest → link → insert, which is the
// serializer the chain contract requires. Other agents append freely
// in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ag_audit::{chain, AuditEntry};
use ag_policy::{AgentPolicy, TeamPolicy};

use crate::dal::{AgentFilter, ApprovalPage, ApprovalQuery, AuditQuery, GuardStore};
use crate::entities::{
    AdminUser, Agent, AgentCredential, ApprovalRequest, ApprovalStatus, RevokedToken,
};
use crate::error::StoreError;

#[derive(Default)]
struct Tables {
    agents: HashMap<String, Agent>,
    /// Keyed by secret digest — the exchange-time lookup index.
    credentials: HashMap<String, AgentCredential>,
    admins: HashMap<String, AdminUser>,
    agent_policies: HashMap<String, AgentPolicy>,
    team_policies: HashMap<String, TeamPolicy>,
    approvals: HashMap<String, ApprovalRequest>,
    /// Per-agent chains in append order.
    audit: HashMap<String, Vec<AuditEntry>>,
    revoked: HashMap<String, RevokedToken>,
}

/// Single-node GuardStore backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Per-agent audit write serializers.
    audit_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        // Lock poisoning only happens when a writer panicked; the store
        // is unusable either way, so propagate as a panic.
        self.tables.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().expect("store lock poisoned")
    }

    fn serializer_for(&self, agent_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.audit_locks.lock().expect("serializer map poisoned");
        locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Test hook: mutate a stored audit entry in place, bypassing the
    /// chain. Exists so tamper detection can be exercised end to end.
    #[doc(hidden)]
    pub fn corrupt_audit_entry(
        &self,
        agent_id: &str,
        index: usize,
        mutate: impl FnOnce(&mut AuditEntry),
    ) -> bool {
        let mut tables = self.write();
        match tables.audit.get_mut(agent_id).and_then(|c| c.get_mut(index)) {
            Some(entry) => {
                mutate(entry);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl GuardStore for MemoryStore {
    async fn create_agent(
        &self,
        agent: Agent,
        credential: AgentCredential,
    ) -> Result<(), StoreError> {
        let mut tables = self.write();
        if tables.agents.contains_key(&agent.agent_id) {
            return Err(StoreError::Conflict(agent.agent_id));
        }
        tables
            .credentials
            .insert(credential.secret_hash.clone(), credential);
        tables.agents.insert(agent.agent_id.clone(), agent);
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.read().agents.get(agent_id).cloned())
    }

    async fn list_agents(&self, filter: AgentFilter) -> Result<Vec<Agent>, StoreError> {
        let tables = self.read();
        let mut agents: Vec<Agent> = tables
            .agents
            .values()
            .filter(|a| filter.include_inactive || a.is_active)
            .filter(|a| {
                filter
                    .team
                    .as_ref()
                    .map(|t| &a.owner_team == t)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(agents)
    }

    async fn deactivate_agent(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Agent, StoreError> {
        let mut tables = self.write();
        let agent = tables
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| StoreError::NotFound(agent_id.to_string()))?;
        agent.is_active = false;
        agent.updated_at = now;
        let updated = agent.clone();

        for credential in tables.credentials.values_mut() {
            if credential.agent_id == agent_id {
                credential.is_active = false;
            }
        }
        Ok(updated)
    }

    async fn find_agent_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<Agent>, StoreError> {
        let tables = self.read();
        let agent = tables
            .credentials
            .get(secret_hash)
            .filter(|c| c.is_active)
            .and_then(|c| tables.agents.get(&c.agent_id))
            .cloned();
        Ok(agent)
    }

    async fn insert_admin(&self, admin: AdminUser) -> Result<(), StoreError> {
        let mut tables = self.write();
        if tables.admins.contains_key(&admin.admin_id) {
            return Err(StoreError::Conflict(admin.admin_id));
        }
        tables.admins.insert(admin.admin_id.clone(), admin);
        Ok(())
    }

    async fn get_admin(&self, admin_id: &str) -> Result<Option<AdminUser>, StoreError> {
        Ok(self.read().admins.get(admin_id).cloned())
    }

    async fn find_admin_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<AdminUser>, StoreError> {
        let tables = self.read();
        Ok(tables
            .admins
            .values()
            .find(|a| a.is_active && a.credential_hash == secret_hash)
            .cloned())
    }

    async fn put_agent_policy(&self, policy: AgentPolicy) -> Result<(), StoreError> {
        self.write()
            .agent_policies
            .insert(policy.agent_id.clone(), policy);
        Ok(())
    }

    async fn get_agent_policy(
        &self,
        agent_id: &str,
    ) -> Result<Option<AgentPolicy>, StoreError> {
        Ok(self.read().agent_policies.get(agent_id).cloned())
    }

    async fn put_team_policy(&self, policy: TeamPolicy) -> Result<(), StoreError> {
        self.write()
            .team_policies
            .insert(policy.team.clone(), policy);
        Ok(())
    }

    async fn get_team_policy(&self, team: &str) -> Result<Option<TeamPolicy>, StoreError> {
        Ok(self.read().team_policies.get(team).cloned())
    }

    async fn insert_approval(&self, approval: ApprovalRequest) -> Result<(), StoreError> {
        let mut tables = self.write();
        if tables.approvals.contains_key(&approval.approval_id) {
            return Err(StoreError::Conflict(approval.approval_id));
        }
        tables
            .approvals
            .insert(approval.approval_id.clone(), approval);
        Ok(())
    }

    async fn get_approval(
        &self,
        approval_id: &str,
    ) -> Result<Option<ApprovalRequest>, StoreError> {
        Ok(self.read().approvals.get(approval_id).cloned())
    }

    async fn decide_approval(
        &self,
        approval_id: &str,
        status: ApprovalStatus,
        decided_by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, StoreError> {
        let mut tables = self.write();
        let approval = tables
            .approvals
            .get_mut(approval_id)
            .ok_or_else(|| StoreError::NotFound(approval_id.to_string()))?;
        if approval.status.is_terminal() {
            return Err(StoreError::AlreadyDecided);
        }
        approval.status = status;
        approval.decided_at = Some(now);
        approval.decided_by = Some(decided_by.to_string());
        approval.decision_reason = reason;
        Ok(approval.clone())
    }

    async fn list_approvals(&self, query: ApprovalQuery) -> Result<ApprovalPage, StoreError> {
        let tables = self.read();
        let pending_count = tables
            .approvals
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending)
            .count();

        let mut approvals: Vec<ApprovalRequest> = tables
            .approvals
            .values()
            .filter(|a| query.status.map(|s| a.status == s).unwrap_or(true))
            .filter(|a| {
                query
                    .agent_id
                    .as_ref()
                    .map(|id| &a.agent_id == id)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        approvals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        approvals.truncate(query.limit);

        Ok(ApprovalPage {
            approvals,
            pending_count,
        })
    }

    async fn append_audit(&self, mut entry: AuditEntry) -> Result<AuditEntry, StoreError> {
        let serializer = self.serializer_for(&entry.agent_id);
        let _guard = serializer.lock().expect("audit serializer poisoned");

        // Under the serializer: read the latest link, compute, insert.
        // A competing append for the same agent waits on the guard above.
        let prev = {
            let tables = self.read();
            tables
                .audit
                .get(&entry.agent_id)
                .and_then(|c| c.last())
                .map(|last| (last.log_id, last.chain_hash.clone()))
        };
        chain::link_entry(&mut entry, prev.as_ref().map(|(id, h)| (*id, h.as_str())));

        let mut tables = self.write();
        tables
            .audit
            .entry(entry.agent_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn audit_chain(&self, agent_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.read().audit.get(agent_id).cloned().unwrap_or_default())
    }

    async fn query_audit(&self, query: AuditQuery) -> Result<Vec<AuditEntry>, StoreError> {
        let tables = self.read();
        let mut entries: Vec<AuditEntry> = tables
            .audit
            .iter()
            .filter(|(agent_id, _)| {
                query
                    .agent_id
                    .as_ref()
                    .map(|id| agent_id.as_str() == id.as_str())
                    .unwrap_or(true)
            })
            .flat_map(|(_, chain)| chain.iter())
            .filter(|e| query.result.map(|r| e.result == r).unwrap_or(true))
            .filter(|e| query.since.map(|t| e.timestamp >= t).unwrap_or(true))
            .filter(|e| query.until.map(|t| e.timestamp <= t).unwrap_or(true))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.log_id.cmp(&a.log_id))
        });
        entries.truncate(query.limit);
        Ok(entries)
    }

    async fn revoke_token(&self, token: RevokedToken) -> Result<(), StoreError> {
        // Idempotent: re-revoking keeps the original row.
        self.write()
            .revoked
            .entry(token.jti.clone())
            .or_insert(token);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.read().revoked.contains_key(jti))
    }

    async fn sweep_revocations(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tables = self.write();
        let before = tables.revoked.len();
        tables.revoked.retain(|_, row| row.expires_at >= cutoff);
        Ok(before - tables.revoked.len())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
