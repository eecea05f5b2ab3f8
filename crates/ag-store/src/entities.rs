// entities.rs — Stored entity records.
//
// Identifiers are opaque strings with documented prefixes: "agt_" for
// agents, "adm_" for admin users, "ap_" for approval requests. Agents
// are never hard-deleted while their audit chain exists; deactivation
// flips is_active and invalidates credentials, policy and audit stay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// The role model lives with the auth primitives; stored admin records
// reference it directly.
use ag_auth::Role;

/// Deployment environment an agent runs in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// A registered agent identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub display_name: String,
    pub owner_team: String,
    pub environment: Environment,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        display_name: impl Into<String>,
        owner_team: impl Into<String>,
        environment: Environment,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: new_agent_id(),
            display_name: display_name.into(),
            owner_team: owner_team.into(),
            environment,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A static API credential for an agent. The raw secret is returned to
/// the caller exactly once; only the digest and a diagnostic prefix stay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCredential {
    pub agent_id: String,
    pub secret_hash: String,
    pub secret_prefix: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A human administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub admin_id: String,
    pub display_name: String,
    pub role: Role,
    /// None = all teams.
    pub team: Option<String>,
    pub credential_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of an approval request. Pending is the only
/// non-terminal status; a decided request never transitions again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
        }
    }
}

/// A suspended verdict awaiting a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub agent_id: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub context: Value,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub decision_reason: Option<String>,
}

impl ApprovalRequest {
    pub fn new(
        agent_id: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        context: Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            approval_id: new_approval_id(),
            agent_id: agent_id.into(),
            action: action.into(),
            resource: resource.into(),
            context,
            status: ApprovalStatus::Pending,
            created_at: now,
            decided_at: None,
            decided_by: None,
            decision_reason: None,
        }
    }
}

/// A revoked token id, kept until its natural expiry has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedToken {
    pub jti: String,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub fn new_agent_id() -> String {
    format!("agt_{}", Uuid::new_v4().simple())
}

pub fn new_admin_id() -> String {
    format!("adm_{}", Uuid::new_v4().simple())
}

pub fn new_approval_id() -> String {
    format!("ap_{}", Uuid::new_v4().simple())
}
