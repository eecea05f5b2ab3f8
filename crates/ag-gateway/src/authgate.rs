// authgate.rs — Identity resolution and request admission.
//
// Runs on every guarded request, in order: authenticate → rate-limit →
// attach identity. A bearer token takes precedence over the legacy
// static-key headers when both are present. All credential failures
// collapse to one of two uniform 401 bodies; the concrete reason only
// reaches the log.
//
// Verification order for tokens is contractual: signature, expiry,
// revocation, then (in the handlers) endpoint class.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

use ag_auth::{constant_time_eq, secret_hash, Role, TokenType};

use crate::context::{AppContext, IMPLICIT_ADMIN_ID};
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::ratelimit::Bucket;

const ADMIN_KEY_HEADER: &str = "x-admin-key";
const AGENT_KEY_HEADER: &str = "x-agent-key";

/// An authenticated agent.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub team: String,
    pub env: String,
    /// Set when authenticated by bearer token; None for legacy keys.
    pub jti: Option<String>,
    pub token_exp: Option<DateTime<Utc>>,
}

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub admin_id: String,
    pub role: Role,
    /// None = all teams.
    pub team: Option<String>,
    pub jti: Option<String>,
    pub token_exp: Option<DateTime<Utc>>,
}

/// Who is calling, resolved once per request and attached as an extension.
#[derive(Debug, Clone)]
pub enum Identity {
    Agent(AgentIdentity),
    Admin(AdminIdentity),
    Public { client_ip: String },
}

impl Identity {
    /// The rate-limiter key for this caller.
    pub fn rate_key(&self) -> String {
        match self {
            Identity::Agent(agent) => format!("agent:{}", agent.agent_id),
            Identity::Admin(admin) => format!("admin:{}", admin.admin_id),
            Identity::Public { client_ip } => format!("ip:{}", client_ip),
        }
    }

    pub fn require_agent(&self) -> Result<&AgentIdentity, GatewayError> {
        match self {
            Identity::Agent(agent) => Ok(agent),
            // Authenticated but the wrong class → 403; anonymous → 401.
            Identity::Admin(_) => Err(GatewayError::WrongClass("agent")),
            Identity::Public { .. } => Err(GatewayError::Unauthorized),
        }
    }

    /// Any admin role, including read-only auditors.
    pub fn require_admin(&self) -> Result<&AdminIdentity, GatewayError> {
        match self {
            Identity::Admin(admin) => Ok(admin),
            Identity::Agent(_) => Err(GatewayError::WrongClass("admin")),
            Identity::Public { .. } => Err(GatewayError::Unauthorized),
        }
    }

    /// An admin role that may mutate agents and policies.
    pub fn require_admin_write(&self) -> Result<&AdminIdentity, GatewayError> {
        let admin = self.require_admin()?;
        if !admin.role.can_write() {
            return Err(GatewayError::WrongClass("admin"));
        }
        Ok(admin)
    }

    /// An admin role that may decide approvals (role ≥ approver).
    pub fn require_approver(&self) -> Result<&AdminIdentity, GatewayError> {
        let admin = self.require_admin()?;
        if !admin.role.can_decide_approvals() {
            return Err(GatewayError::WrongClass("approver"));
        }
        Ok(admin)
    }
}

/// Authenticate, admit, and annotate one request.
pub async fn gate(
    State(ctx): State<Arc<AppContext>>,
    mut request: Request,
    next: Next,
) -> Response {
    Metrics::incr(&ctx.metrics.requests_total);

    // Extracted synchronously so the identity-resolution future below
    // never holds a `&Request` across an `.await` (the body's trait
    // object is `Send` but not `Sync`, which would make that future
    // non-`Send`).
    let inputs = IdentityInputs::extract(&request);

    let identity = match resolve_identity(&ctx, inputs).await {
        Ok(identity) => identity,
        Err(err) => {
            Metrics::incr(&ctx.metrics.auth_failures_total);
            return err.into_response();
        }
    };

    let bucket = bucket_for(&identity, request.method(), request.uri().path());
    let admission = ctx
        .limiter
        .admit(bucket, &identity.rate_key(), ctx.clock.now());
    if !admission.allowed {
        Metrics::incr(&ctx.metrics.rate_limited_total);
        tracing::debug!(
            bucket = bucket.as_str(),
            key = %identity.rate_key(),
            "rate limit exceeded"
        );
        return GatewayError::RateLimited {
            retry_after: admission.retry_after,
        }
        .into_response();
    }

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Which bucket a request draws from. Agents split by path, admins by
/// method, everyone else shares the public bucket keyed by client IP.
fn bucket_for(identity: &Identity, method: &Method, path: &str) -> Bucket {
    match identity {
        Identity::Agent(_) => {
            if path.starts_with("/logs") {
                Bucket::Logs
            } else {
                Bucket::Enforce
            }
        }
        Identity::Admin(_) => {
            if method == Method::GET || method == Method::HEAD {
                Bucket::AdminRead
            } else {
                Bucket::AdminWrite
            }
        }
        Identity::Public { .. } => Bucket::Public,
    }
}

/// Credential material read off a request, owned so identity resolution
/// can be async without holding a `&Request` across an `.await`.
struct IdentityInputs {
    bearer_token: Option<String>,
    admin_key: Option<String>,
    agent_key: Option<String>,
    client_ip: String,
}

impl IdentityInputs {
    fn extract(request: &Request) -> Self {
        let headers = request.headers();

        // Bearer takes precedence over legacy static keys.
        let bearer_token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.to_string());
        let admin_key = headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let agent_key = headers
            .get(AGENT_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Self {
            bearer_token,
            admin_key,
            agent_key,
            client_ip: client_ip(request),
        }
    }
}

async fn resolve_identity(
    ctx: &AppContext,
    inputs: IdentityInputs,
) -> Result<Identity, GatewayError> {
    if let Some(token) = inputs.bearer_token {
        return resolve_token(ctx, &token).await;
    }

    if let Some(key) = inputs.admin_key {
        return resolve_admin_key(ctx, &key).await;
    }

    if let Some(key) = inputs.agent_key {
        return resolve_agent_key(ctx, &key).await;
    }

    Ok(Identity::Public {
        client_ip: inputs.client_ip,
    })
}

async fn resolve_token(ctx: &AppContext, token: &str) -> Result<Identity, GatewayError> {
    let now = ctx.clock.now();

    // (1) signature, (2) expiry.
    let claims = ctx.tokens.verify(token, now).map_err(|e| {
        tracing::debug!(reason = %e, "token rejected");
        GatewayError::InvalidToken
    })?;

    // (3) revocation.
    if ctx
        .store
        .is_revoked(&claims.jti)
        .await
        .map_err(GatewayError::from)?
    {
        tracing::debug!(jti = %claims.jti, "token rejected: revoked");
        return Err(GatewayError::InvalidToken);
    }

    let token_exp = DateTime::<Utc>::from_timestamp(claims.exp, 0);

    match claims.token_type {
        TokenType::Agent => {
            // Deactivation cuts off live tokens too.
            let agent = ctx
                .store
                .get_agent(&claims.sub)
                .await
                .map_err(GatewayError::from)?
                .filter(|a| a.is_active)
                .ok_or_else(|| {
                    tracing::debug!(sub = %claims.sub, "token rejected: agent inactive");
                    GatewayError::InvalidToken
                })?;
            Ok(Identity::Agent(AgentIdentity {
                agent_id: agent.agent_id,
                team: agent.owner_team,
                env: agent.environment.to_string(),
                jti: Some(claims.jti),
                token_exp,
            }))
        }
        TokenType::Admin => {
            let role = claims.role.ok_or_else(|| {
                tracing::debug!(sub = %claims.sub, "token rejected: admin claims missing role");
                GatewayError::InvalidToken
            })?;
            if claims.sub != IMPLICIT_ADMIN_ID {
                let active = ctx
                    .store
                    .get_admin(&claims.sub)
                    .await
                    .map_err(GatewayError::from)?
                    .map(|a| a.is_active)
                    .unwrap_or(false);
                if !active {
                    tracing::debug!(sub = %claims.sub, "token rejected: admin inactive");
                    return Err(GatewayError::InvalidToken);
                }
            }
            Ok(Identity::Admin(AdminIdentity {
                admin_id: claims.sub,
                role,
                team: claims.team,
                jti: Some(claims.jti),
                token_exp,
            }))
        }
    }
}

async fn resolve_admin_key(ctx: &AppContext, key: &str) -> Result<Identity, GatewayError> {
    // The process-wide shared secret grants implicit super-admin.
    if constant_time_eq(key, &ctx.admin_api_key) {
        return Ok(Identity::Admin(AdminIdentity {
            admin_id: IMPLICIT_ADMIN_ID.to_string(),
            role: Role::SuperAdmin,
            team: None,
            jti: None,
            token_exp: None,
        }));
    }

    let admin = ctx
        .store
        .find_admin_by_secret_hash(&secret_hash(key))
        .await
        .map_err(GatewayError::from)?
        .ok_or_else(|| {
            tracing::debug!("admin key rejected: no matching credential");
            GatewayError::Unauthorized
        })?;
    Ok(Identity::Admin(AdminIdentity {
        admin_id: admin.admin_id,
        role: admin.role,
        team: admin.team,
        jti: None,
        token_exp: None,
    }))
}

async fn resolve_agent_key(ctx: &AppContext, key: &str) -> Result<Identity, GatewayError> {
    let agent = ctx
        .store
        .find_agent_by_secret_hash(&secret_hash(key))
        .await
        .map_err(GatewayError::from)?
        .filter(|a| a.is_active)
        .ok_or_else(|| {
            tracing::debug!("agent key rejected: no matching active credential");
            GatewayError::Unauthorized
        })?;
    Ok(Identity::Agent(AgentIdentity {
        agent_id: agent.agent_id,
        team: agent.owner_team,
        env: agent.environment.to_string(),
        jti: None,
        token_exp: None,
    }))
}

/// Best-effort client address for the public rate bucket.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_identity() -> Identity {
        Identity::Agent(AgentIdentity {
            agent_id: "agt_1".into(),
            team: "t1".into(),
            env: "prod".into(),
            jti: None,
            token_exp: None,
        })
    }

    fn admin_identity(role: Role) -> Identity {
        Identity::Admin(AdminIdentity {
            admin_id: "adm_1".into(),
            role,
            team: None,
            jti: None,
            token_exp: None,
        })
    }

    #[test]
    fn class_checks() {
        assert!(agent_identity().require_agent().is_ok());
        assert!(agent_identity().require_admin().is_err());
        assert!(admin_identity(Role::Admin).require_admin().is_ok());
        assert!(admin_identity(Role::Admin).require_agent().is_err());

        // Anonymous callers are 401, not 403.
        let public = Identity::Public {
            client_ip: "10.0.0.1".into(),
        };
        assert!(matches!(
            public.require_agent(),
            Err(GatewayError::Unauthorized)
        ));
        assert!(matches!(
            public.require_admin(),
            Err(GatewayError::Unauthorized)
        ));
        // Cross-class callers are 403.
        assert!(matches!(
            agent_identity().require_admin(),
            Err(GatewayError::WrongClass("admin"))
        ));
        assert!(matches!(
            admin_identity(Role::Admin).require_agent(),
            Err(GatewayError::WrongClass("agent"))
        ));
    }

    #[test]
    fn role_gates() {
        assert!(admin_identity(Role::Auditor).require_admin().is_ok());
        assert!(admin_identity(Role::Auditor).require_admin_write().is_err());
        assert!(admin_identity(Role::Auditor).require_approver().is_err());
        assert!(admin_identity(Role::Approver).require_approver().is_ok());
        assert!(admin_identity(Role::Approver).require_admin_write().is_err());
        assert!(admin_identity(Role::SuperAdmin).require_admin_write().is_ok());
        assert!(admin_identity(Role::SuperAdmin).require_approver().is_ok());
    }

    #[test]
    fn rate_keys() {
        assert_eq!(agent_identity().rate_key(), "agent:agt_1");
        assert_eq!(admin_identity(Role::Admin).rate_key(), "admin:adm_1");
        assert_eq!(
            Identity::Public {
                client_ip: "10.0.0.1".into()
            }
            .rate_key(),
            "ip:10.0.0.1"
        );
    }

    #[test]
    fn bucket_selection() {
        let agent = agent_identity();
        let admin = admin_identity(Role::Admin);
        let public = Identity::Public {
            client_ip: "10.0.0.1".into(),
        };

        assert_eq!(bucket_for(&agent, &Method::POST, "/enforce"), Bucket::Enforce);
        assert_eq!(bucket_for(&agent, &Method::POST, "/logs"), Bucket::Logs);
        assert_eq!(bucket_for(&agent, &Method::GET, "/logs"), Bucket::Logs);
        assert_eq!(
            bucket_for(&admin, &Method::GET, "/agents"),
            Bucket::AdminRead
        );
        assert_eq!(
            bucket_for(&admin, &Method::POST, "/agents"),
            Bucket::AdminWrite
        );
        assert_eq!(bucket_for(&public, &Method::POST, "/token"), Bucket::Public);
    }
}
