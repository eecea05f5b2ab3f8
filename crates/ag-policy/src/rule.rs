// rule.rs — Policy rules and the first-match scan.
//
// A rule matches when its (normalized) action glob matches the incoming
// action, its resource glob matches the incoming resource, and its
// conditions hold. Rule lists are scanned in order; the FIRST matching
// rule decides and names the decision's reason. The decision engine
// concatenates team rules ahead of agent rules before scanning, so a
// team rule at any position beats an agent rule in the same list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conditions::{RuleConditions, RuntimeContext};
use crate::error::PolicyError;
use crate::normalize::{matches_pattern, normalize_action, validate_pattern};

/// One policy rule: an action glob, an optional resource glob, and
/// optional runtime conditions.
///
/// The action is stored exactly as the author wrote it; expansion of bare
/// verbs (`"read"` → `"read:*"`) happens at match time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyRule {
    /// Action glob, e.g. "read:file", "read:*", "*".
    pub action: String,

    /// Resource glob. Absent means "*" (any resource).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// AND-ed runtime guards. Absent means the rule always applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<RuleConditions>,
}

impl PolicyRule {
    /// Validate the rule's patterns and condition bounds for storage.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if normalize_action(&self.action).is_empty() {
            return Err(PolicyError::EmptyAction);
        }
        if !validate_pattern(&normalize_action(&self.action)) {
            return Err(PolicyError::InvalidPattern(self.action.clone()));
        }
        if let Some(resource) = &self.resource {
            if !validate_pattern(resource) {
                return Err(PolicyError::InvalidPattern(resource.clone()));
            }
        }
        if let Some(conditions) = &self.conditions {
            conditions.validate()?;
        }
        Ok(())
    }

    /// The resource glob this rule applies to ("*" when unset).
    pub fn resource_pattern(&self) -> &str {
        self.resource.as_deref().unwrap_or("*")
    }
}

/// The per-agent policy: three ordered rule lists.
///
/// Exactly one exists per agent; an agent without one is denied everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPolicy {
    pub agent_id: String,
    #[serde(default)]
    pub allow: Vec<PolicyRule>,
    #[serde(default)]
    pub deny: Vec<PolicyRule>,
    #[serde(default)]
    pub require_approval: Vec<PolicyRule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A team-level policy merged ahead of every member agent's own policy.
/// Absence contributes nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamPolicy {
    pub team: String,
    #[serde(default)]
    pub allow: Vec<PolicyRule>,
    #[serde(default)]
    pub deny: Vec<PolicyRule>,
    #[serde(default)]
    pub require_approval: Vec<PolicyRule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check a single rule against an already-normalized action, a resource,
/// and the runtime context.
pub fn rule_matches(
    rule: &PolicyRule,
    action: &str,
    resource: &str,
    ctx: &RuntimeContext,
) -> bool {
    if !matches_pattern(&normalize_action(&rule.action), action) {
        return false;
    }
    if !matches_pattern(rule.resource_pattern(), resource) {
        return false;
    }
    match &rule.conditions {
        Some(conditions) => conditions.evaluate(ctx),
        None => true,
    }
}

/// The outcome of a first-match scan: which rule fired and where it sat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch<'a> {
    pub rule: &'a PolicyRule,
    /// Position within the scanned (concatenated) list.
    pub position: usize,
}

/// Scan a rule list in order and return the first match, if any.
pub fn first_match<'a>(
    rules: &'a [PolicyRule],
    action: &str,
    resource: &str,
    ctx: &RuntimeContext,
) -> Option<RuleMatch<'a>> {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule_matches(rule, action, resource, ctx))
        .map(|(position, rule)| RuleMatch { rule, position })
}
