// agents.rs — Agent registration and lifecycle.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use ag_auth::{generate_secret, secret_hash, secret_prefix, AGENT_KEY_PREFIX};
use ag_store::{Agent, AgentCredential, AgentFilter, Environment};

use crate::authgate::Identity;
use crate::context::AppContext;
use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub owner_team: String,
    #[serde(default)]
    pub environment: String,
}

/// The creation response is the only place the raw API key ever appears.
#[derive(Debug, Serialize)]
pub struct AgentCreated {
    #[serde(flatten)]
    pub agent: Agent,
    pub api_key: String,
}

/// POST /agents (admin, write).
pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateAgentRequest>,
) -> Result<Json<AgentCreated>, GatewayError> {
    identity.require_admin_write()?;

    let mut problems = Vec::new();
    if body.display_name.trim().is_empty() {
        problems.push("display_name: must not be empty".to_string());
    }
    if body.owner_team.trim().is_empty() {
        problems.push("owner_team: must not be empty".to_string());
    }
    if let Err(e) = body.environment.parse::<Environment>() {
        problems.push(format!("environment: {}", e));
    }
    if !problems.is_empty() {
        return Err(GatewayError::Validation(problems));
    }
    let environment: Environment = body
        .environment
        .parse()
        .map_err(|e| GatewayError::Validation(vec![format!("environment: {}", e)]))?;

    let now = ctx.clock.now();
    let agent = Agent::new(
        body.display_name.trim(),
        body.owner_team.trim(),
        environment,
        now,
    );
    let api_key = generate_secret(AGENT_KEY_PREFIX);
    let credential = AgentCredential {
        agent_id: agent.agent_id.clone(),
        secret_hash: secret_hash(&api_key),
        secret_prefix: secret_prefix(&api_key),
        is_active: true,
        created_at: now,
    };
    ctx.store.create_agent(agent.clone(), credential).await?;

    tracing::info!(agent_id = %agent.agent_id, team = %agent.owner_team, "agent created");
    Ok(Json(AgentCreated { agent, api_key }))
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /agents (admin).
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<Json<Vec<Agent>>, GatewayError> {
    identity.require_admin()?;
    let agents = ctx
        .store
        .list_agents(AgentFilter {
            team: query.team,
            include_inactive: query.include_inactive,
        })
        .await?;
    Ok(Json(agents))
}

/// GET /agents/{id} (admin).
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, GatewayError> {
    identity.require_admin()?;
    let agent = ctx
        .store
        .get_agent(&agent_id)
        .await?
        .ok_or(GatewayError::NotFound)?;
    Ok(Json(agent))
}

/// DELETE /agents/{id} (admin, write) — soft-deactivate. Credentials die
/// with it; policy and the audit chain are retained. Pending approvals
/// stay decidable.
pub async fn deactivate(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(agent_id): Path<String>,
) -> Result<Json<Agent>, GatewayError> {
    identity.require_admin_write()?;
    let agent = ctx
        .store
        .deactivate_agent(&agent_id, ctx.clock.now())
        .await?;
    tracing::info!(agent_id = %agent.agent_id, "agent deactivated");
    Ok(Json(agent))
}
