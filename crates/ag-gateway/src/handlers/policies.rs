// policies.rs — Agent and team policy reads/writes.
//
// Rules are validated structurally at write time (glob patterns parse,
// condition bounds parse) but stored exactly as authored: bare verbs
// expand at match time, not here.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use ag_policy::{AgentPolicy, PolicyRule, TeamPolicy};

use crate::authgate::Identity;
use crate::context::AppContext;
use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
pub struct PolicyBody {
    #[serde(default)]
    pub allow: Vec<PolicyRule>,
    #[serde(default)]
    pub deny: Vec<PolicyRule>,
    #[serde(default)]
    pub require_approval: Vec<PolicyRule>,
}

impl PolicyBody {
    /// Collect one message per offending rule, addressed by list + index.
    fn validate(&self) -> Result<(), GatewayError> {
        let mut problems = Vec::new();
        for (list, rules) in [
            ("allow", &self.allow),
            ("deny", &self.deny),
            ("require_approval", &self.require_approval),
        ] {
            for (index, rule) in rules.iter().enumerate() {
                if let Err(e) = rule.validate() {
                    problems.push(format!("{}[{}]: {}", list, index, e));
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Validation(problems))
        }
    }
}

/// PUT /agents/{id}/policy (admin, write).
pub async fn put_agent_policy(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(agent_id): Path<String>,
    Json(body): Json<PolicyBody>,
) -> Result<Json<AgentPolicy>, GatewayError> {
    identity.require_admin_write()?;
    body.validate()?;

    // Policies only exist for registered agents.
    ctx.store
        .get_agent(&agent_id)
        .await?
        .ok_or(GatewayError::NotFound)?;

    let now = ctx.clock.now();
    let created_at = existing_created_at(
        ctx.store.get_agent_policy(&agent_id).await?.map(|p| p.created_at),
        now,
    );
    let policy = AgentPolicy {
        agent_id: agent_id.clone(),
        allow: body.allow,
        deny: body.deny,
        require_approval: body.require_approval,
        created_at,
        updated_at: now,
    };
    ctx.store.put_agent_policy(policy.clone()).await?;
    tracing::info!(agent_id = %agent_id, "agent policy updated");
    Ok(Json(policy))
}

/// GET /agents/{id}/policy (admin).
pub async fn get_agent_policy(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentPolicy>, GatewayError> {
    identity.require_admin()?;
    let policy = ctx
        .store
        .get_agent_policy(&agent_id)
        .await?
        .ok_or(GatewayError::NotFound)?;
    Ok(Json(policy))
}

/// PUT /teams/{team}/policy (admin, write). Teams are implicit — any
/// non-empty name owns exactly one policy slot.
pub async fn put_team_policy(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(team): Path<String>,
    Json(body): Json<PolicyBody>,
) -> Result<Json<TeamPolicy>, GatewayError> {
    identity.require_admin_write()?;
    body.validate()?;

    let now = ctx.clock.now();
    let created_at = existing_created_at(
        ctx.store.get_team_policy(&team).await?.map(|p| p.created_at),
        now,
    );
    let policy = TeamPolicy {
        team: team.clone(),
        allow: body.allow,
        deny: body.deny,
        require_approval: body.require_approval,
        created_at,
        updated_at: now,
    };
    ctx.store.put_team_policy(policy.clone()).await?;
    tracing::info!(team = %team, "team policy updated");
    Ok(Json(policy))
}

/// GET /teams/{team}/policy (admin).
pub async fn get_team_policy(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(team): Path<String>,
) -> Result<Json<TeamPolicy>, GatewayError> {
    identity.require_admin()?;
    let policy = ctx
        .store
        .get_team_policy(&team)
        .await?
        .ok_or(GatewayError::NotFound)?;
    Ok(Json(policy))
}

fn existing_created_at(existing: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    existing.unwrap_or(now)
}
