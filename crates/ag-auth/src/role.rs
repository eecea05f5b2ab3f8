// role.rs — Admin role model.

use serde::{Deserialize, Serialize};

/// What an admin identity is allowed to do.
///
/// Serialized kebab-case ("super-admin") to match the stored records and
/// token claims.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Full control, every team. The process-wide shared admin key maps here.
    SuperAdmin,
    /// Create/deactivate agents, write policies, decide approvals.
    Admin,
    /// Read-only access to agents, policies, logs, and approvals.
    Auditor,
    /// Read access plus the ability to decide approvals.
    Approver,
}

impl Role {
    /// May mutate agents and policies.
    pub fn can_write(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    /// May approve or deny pending approval requests.
    pub fn can_decide_approvals(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin | Role::Approver)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super-admin",
            Role::Admin => "admin",
            Role::Auditor => "auditor",
            Role::Approver => "approver",
        }
    }
}
