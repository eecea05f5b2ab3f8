// tokens.rs — Key exchange, revocation, and the verification key set.

use std::sync::Arc;

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use ag_auth::{constant_time_eq, secret_hash, Jwks, Role};
use ag_store::RevokedToken;

use crate::authgate::Identity;
use crate::context::{AppContext, IMPLICIT_ADMIN_ID};
use crate::error::GatewayError;

/// Exactly one of the two keys must be present.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub agent_key: Option<String>,
    #[serde(default)]
    pub admin_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

/// POST /token — exchange a static key for a short-lived bearer token.
pub async fn exchange(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, GatewayError> {
    let now = ctx.clock.now();

    if let Some(agent_key) = &body.agent_key {
        let agent = ctx
            .store
            .find_agent_by_secret_hash(&secret_hash(agent_key))
            .await?
            .filter(|a| a.is_active)
            .ok_or(GatewayError::Unauthorized)?;
        let (access_token, _) = ctx
            .tokens
            .issue_agent(
                &agent.agent_id,
                agent.environment.as_str(),
                &agent.owner_team,
                now,
            )
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        return Ok(Json(TokenResponse {
            access_token,
            token_type: "bearer",
            expires_in: ctx.tokens.agent_expires_in(),
        }));
    }

    if let Some(admin_key) = &body.admin_key {
        // The process-wide shared secret maps to the implicit super-admin.
        let (token, expires_in) = if constant_time_eq(admin_key, &ctx.admin_api_key) {
            let (token, _) = ctx
                .tokens
                .issue_admin(IMPLICIT_ADMIN_ID, Role::SuperAdmin, None, now)
                .map_err(|e| GatewayError::Internal(e.to_string()))?;
            (token, ctx.tokens.admin_expires_in())
        } else {
            let admin = ctx
                .store
                .find_admin_by_secret_hash(&secret_hash(admin_key))
                .await?
                .ok_or(GatewayError::Unauthorized)?;
            let (token, _) = ctx
                .tokens
                .issue_admin(&admin.admin_id, admin.role, admin.team.as_deref(), now)
                .map_err(|e| GatewayError::Internal(e.to_string()))?;
            (token, ctx.tokens.admin_expires_in())
        };
        return Ok(Json(TokenResponse {
            access_token: token,
            token_type: "bearer",
            expires_in,
        }));
    }

    Err(GatewayError::Validation(vec![
        "body: provide agent_key or admin_key".to_string(),
    ]))
}

/// POST /token/revoke — revoke the presented bearer token's jti.
pub async fn revoke(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let (jti, token_exp) = match &identity {
        Identity::Agent(agent) => (agent.jti.clone(), agent.token_exp),
        Identity::Admin(admin) => (admin.jti.clone(), admin.token_exp),
        Identity::Public { .. } => (None, None),
    };
    // Legacy static keys have no jti; there is nothing to revoke.
    let jti = jti.ok_or(GatewayError::Unauthorized)?;

    let now = ctx.clock.now();
    // Tombstone until natural expiry; the sweeper reclaims it afterwards.
    let expires_at = token_exp.unwrap_or_else(|| now + chrono::Duration::hours(8));
    ctx.store
        .revoke_token(RevokedToken {
            jti,
            revoked_at: now,
            expires_at,
        })
        .await?;
    Ok(Json(json!({ "revoked": true })))
}

/// GET /.well-known/jwks.json — the public verification key set.
pub async fn jwks(State(ctx): State<Arc<AppContext>>) -> Json<Jwks> {
    Json(ctx.tokens.jwks())
}
