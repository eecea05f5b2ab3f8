// engine.rs — The policy decision engine.
//
// decide() is the single chokepoint for enforcement. Evaluation order is
// contractual:
//
//   1. Load the agent policy and the owner team's policy.
//   2. Concatenate team rules ahead of agent rules per list.
//   3. Deny rules first — a matching deny beats everything.
//   4. Approval rules next — a match suspends into a pending approval.
//   5. Allow rules last.
//   6. Nothing matched → deny.
//
// Every call writes exactly one audit entry before the verdict is
// returned; if that write fails the verdict is withheld entirely. A
// policy-store failure short-circuits to the safe default (deny) and is
// recorded with result=error. Never fail open.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use ag_audit::{AuditEntry, AuditResult};
use ag_policy::{normalize_action, rule_matches, PolicyRule, RuntimeContext};
use ag_store::{Agent, ApprovalRequest, GuardStore, StoreError};

use crate::clock::Clock;
use crate::error::GatewayError;

/// The engine's output for one enforcement call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow { reason: String },
    Deny { reason: String },
    Pending { approval_id: String },
}

/// A decision plus the approval record it opened, when pending. The
/// caller dispatches the approval.created notification off the request
/// path.
#[derive(Debug)]
pub struct Decision {
    pub verdict: Verdict,
    pub approval: Option<ApprovalRequest>,
    /// True when a dependency outage forced the safe default; the HTTP
    /// layer surfaces these as 503 even though deny was applied and
    /// audited.
    pub degraded: bool,
}

pub struct DecisionEngine {
    store: Arc<dyn GuardStore>,
    clock: Arc<dyn Clock>,
    /// Bound on each dependency call.
    timeout: Duration,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn GuardStore>, clock: Arc<dyn Clock>, timeout_secs: u64) -> Self {
        Self {
            store,
            clock,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Evaluate one request and durably record it.
    pub async fn decide(
        &self,
        agent: &Agent,
        raw_action: &str,
        resource: &str,
        context: Value,
        request_id: &str,
    ) -> Result<Decision, GatewayError> {
        let now = self.clock.now();
        let action = normalize_action(raw_action);
        let runtime = RuntimeContext {
            env: agent.environment.to_string(),
            now,
        };

        // 1. Policies. Unreachable store → default deny, recorded as error.
        let policies = self.load_policies(agent).await;
        let (agent_policy, team_policy) = match policies {
            Ok(pair) => pair,
            Err(err) => {
                tracing::error!(agent_id = %agent.agent_id, error = %err, "policy store unavailable");
                let entry = self
                    .base_entry(agent, &action, resource, context, request_id, false, AuditResult::Error)
                    .with_metadata(json!({ "error": "policy unavailable" }));
                self.append(entry).await?;
                return Ok(Decision {
                    verdict: Verdict::Deny {
                        reason: "policy unavailable".to_string(),
                    },
                    approval: None,
                    degraded: true,
                });
            }
        };

        // 2. Effective lists: team rules precede agent rules by position.
        let deny = chained(team_policy.0.as_slice(), agent_policy.0.as_slice());
        let approval = chained(team_policy.1.as_slice(), agent_policy.1.as_slice());
        let allow = chained(team_policy.2.as_slice(), agent_policy.2.as_slice());

        // 3. Deny precedence.
        if let Some((position, source, rule)) = scan(&deny, &action, resource, &runtime) {
            let reason = format!(
                "matched deny rule {} on {}",
                rule.action,
                rule.resource_pattern()
            );
            let entry = self
                .base_entry(agent, &action, resource, context, request_id, false, AuditResult::Denied)
                .with_metadata(matched_rule_metadata("deny", position, source, rule));
            self.append(entry).await?;
            return Ok(Decision {
                verdict: Verdict::Deny { reason },
                approval: None,
                degraded: false,
            });
        }

        // 4. Approval precedence: suspend into the human-in-the-loop queue.
        if let Some((position, source, rule)) = scan(&approval, &action, resource, &runtime) {
            let approval_request = ApprovalRequest::new(
                &agent.agent_id,
                &action,
                resource,
                context.clone(),
                now,
            );
            match self.insert_approval(approval_request.clone()).await {
                Ok(()) => {}
                Err(err) => {
                    tracing::error!(agent_id = %agent.agent_id, error = %err, "approval queue unavailable");
                    let entry = self
                        .base_entry(agent, &action, resource, context, request_id, false, AuditResult::Error)
                        .with_metadata(json!({ "error": "approval unavailable" }));
                    self.append(entry).await?;
                    return Ok(Decision {
                        verdict: Verdict::Deny {
                            reason: "approval unavailable".to_string(),
                        },
                        approval: None,
                        degraded: true,
                    });
                }
            }

            let mut metadata = matched_rule_metadata("require_approval", position, source, rule);
            metadata["approval_id"] = json!(approval_request.approval_id);
            let entry = self
                .base_entry(agent, &action, resource, context, request_id, false, AuditResult::Pending)
                .with_metadata(metadata);
            self.append(entry).await?;
            return Ok(Decision {
                verdict: Verdict::Pending {
                    approval_id: approval_request.approval_id.clone(),
                },
                approval: Some(approval_request),
                degraded: false,
            });
        }

        // 5. Allow.
        if let Some((position, source, rule)) = scan(&allow, &action, resource, &runtime) {
            let reason = format!(
                "matched allow rule {} on {}",
                rule.action,
                rule.resource_pattern()
            );
            let entry = self
                .base_entry(agent, &action, resource, context, request_id, true, AuditResult::Success)
                .with_metadata(matched_rule_metadata("allow", position, source, rule));
            self.append(entry).await?;
            return Ok(Decision {
                verdict: Verdict::Allow { reason },
                approval: None,
                degraded: false,
            });
        }

        // 6. Default deny.
        let entry = self
            .base_entry(agent, &action, resource, context, request_id, false, AuditResult::Denied)
            .with_metadata(json!({ "matched_rule": Value::Null }));
        self.append(entry).await?;
        Ok(Decision {
            verdict: Verdict::Deny {
                reason: "no matching rule".to_string(),
            },
            approval: None,
            degraded: false,
        })
    }

    /// Load (agent allow/deny/approval lists, team lists), tolerating
    /// absent policies (absent agent policy denies everything by yielding
    /// empty lists; absent team policy contributes nothing).
    #[allow(clippy::type_complexity)]
    async fn load_policies(
        &self,
        agent: &Agent,
    ) -> Result<
        (
            (Vec<PolicyRule>, Vec<PolicyRule>, Vec<PolicyRule>),
            (Vec<PolicyRule>, Vec<PolicyRule>, Vec<PolicyRule>),
        ),
        StoreError,
    > {
        let agent_policy = self
            .bounded(self.store.get_agent_policy(&agent.agent_id))
            .await??;
        let team_policy = self
            .bounded(self.store.get_team_policy(&agent.owner_team))
            .await??;

        let agent_lists = agent_policy
            .map(|p| (p.deny, p.require_approval, p.allow))
            .unwrap_or_default();
        let team_lists = team_policy
            .map(|p| (p.deny, p.require_approval, p.allow))
            .unwrap_or_default();
        Ok((agent_lists, team_lists))
    }

    async fn insert_approval(&self, approval: ApprovalRequest) -> Result<(), StoreError> {
        self.bounded(self.store.insert_approval(approval)).await?
    }

    /// Append the audit entry; a failure here withholds the decision.
    async fn append(&self, entry: AuditEntry) -> Result<AuditEntry, GatewayError> {
        match self.bounded(self.store.append_audit(entry)).await {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(err)) => {
                tracing::error!(error = %err, "audit write failed; withholding decision");
                Err(GatewayError::AuditUnavailable)
            }
            Err(_) => {
                tracing::error!("audit write timed out; withholding decision");
                Err(GatewayError::AuditUnavailable)
            }
        }
    }

    /// Apply the dependency-call timeout to a store future.
    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<Result<T, StoreError>, StoreError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Unavailable("dependency call timed out".to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    fn base_entry(
        &self,
        agent: &Agent,
        action: &str,
        resource: &str,
        context: Value,
        request_id: &str,
        allowed: bool,
        result: AuditResult,
    ) -> AuditEntry {
        AuditEntry::new(
            &agent.agent_id,
            self.clock.now(),
            action,
            resource,
            allowed,
            result,
        )
        .with_context(context)
        .with_request_id(request_id)
    }
}

/// Concatenate team rules ahead of agent rules, remembering the source.
fn chained<'a>(
    team: &'a [PolicyRule],
    agent: &'a [PolicyRule],
) -> Vec<(&'static str, &'a PolicyRule)> {
    team.iter()
        .map(|r| ("team", r))
        .chain(agent.iter().map(|r| ("agent", r)))
        .collect()
}

/// First match by position over a concatenated list.
fn scan<'a>(
    rules: &[(&'static str, &'a PolicyRule)],
    action: &str,
    resource: &str,
    runtime: &RuntimeContext,
) -> Option<(usize, &'static str, &'a PolicyRule)> {
    rules
        .iter()
        .enumerate()
        .find(|(_, (_, rule))| rule_matches(rule, action, resource, runtime))
        .map(|(position, (source, rule))| (position, *source, *rule))
}

fn matched_rule_metadata(
    list: &str,
    position: usize,
    source: &str,
    rule: &PolicyRule,
) -> Value {
    json!({
        "matched_rule": {
            "list": list,
            "position": position,
            "source": source,
            "action": rule.action,
            "resource": rule.resource_pattern(),
        }
    })
}

/// Fresh correlation id for requests that did not carry one.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}
