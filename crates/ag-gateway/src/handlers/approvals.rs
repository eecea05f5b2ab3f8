// approvals.rs — The human-in-the-loop queue.
//
// An approval transitions exactly once: pending → approved | denied.
// A second decision returns 409. Decision notifications go out through
// the webhook notifier after the state change has committed; delivery
// failures never surface here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use ag_store::{ApprovalQuery, ApprovalRequest, ApprovalStatus};

use crate::authgate::Identity;
use crate::context::AppContext;
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::webhook::{ApprovalEvent, WebhookNotifier};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /approvals (admin).
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Value>, GatewayError> {
    identity.require_admin()?;

    let status = match params.status.as_deref() {
        None => None,
        Some("pending") => Some(ApprovalStatus::Pending),
        Some("approved") => Some(ApprovalStatus::Approved),
        Some("denied") => Some(ApprovalStatus::Denied),
        Some(other) => {
            return Err(GatewayError::Validation(vec![format!(
                "status: '{}' is not one of pending, approved, denied",
                other
            )]));
        }
    };

    let page = ctx
        .store
        .list_approvals(ApprovalQuery {
            status,
            agent_id: params.agent_id,
            limit: params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
        })
        .await?;

    Ok(Json(json!({
        "approvals": page.approvals,
        "pending_count": page.pending_count,
    })))
}

/// GET /approvals/{id} (agent or admin) — the poll endpoint. Agents can
/// only see their own approvals; anything else reads as absent.
pub async fn get(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(approval_id): Path<String>,
) -> Result<Json<ApprovalRequest>, GatewayError> {
    let approval = ctx
        .store
        .get_approval(&approval_id)
        .await?
        .ok_or(GatewayError::NotFound)?;

    match &identity {
        Identity::Admin(_) => {}
        Identity::Agent(agent) => {
            if approval.agent_id != agent.agent_id {
                return Err(GatewayError::NotFound);
            }
        }
        Identity::Public { .. } => return Err(GatewayError::Unauthorized),
    }
    Ok(Json(approval))
}

#[derive(Debug, Default, Deserialize)]
pub struct DecideBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /approvals/{id}/approve (admin, role ≥ approver).
pub async fn approve(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(approval_id): Path<String>,
    body: Option<Json<DecideBody>>,
) -> Result<Json<ApprovalRequest>, GatewayError> {
    let reason = body.and_then(|Json(b)| b.reason);
    decide(&ctx, &identity, &approval_id, ApprovalStatus::Approved, reason).await
}

/// POST /approvals/{id}/deny (admin, role ≥ approver). Reason required.
pub async fn deny(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Path(approval_id): Path<String>,
    body: Option<Json<DecideBody>>,
) -> Result<Json<ApprovalRequest>, GatewayError> {
    let reason = body.and_then(|Json(b)| b.reason);
    if reason.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(GatewayError::Validation(vec![
            "reason: required when denying".to_string(),
        ]));
    }
    decide(&ctx, &identity, &approval_id, ApprovalStatus::Denied, reason).await
}

async fn decide(
    ctx: &AppContext,
    identity: &Identity,
    approval_id: &str,
    status: ApprovalStatus,
    reason: Option<String>,
) -> Result<Json<ApprovalRequest>, GatewayError> {
    let admin = identity.require_approver()?;

    let decided = ctx
        .store
        .decide_approval(
            approval_id,
            status,
            &admin.admin_id,
            reason,
            ctx.clock.now(),
        )
        .await?;
    Metrics::incr(&ctx.metrics.approvals_decided);
    tracing::info!(
        approval_id = %decided.approval_id,
        status = decided.status.as_str(),
        decided_by = %admin.admin_id,
        "approval decided"
    );

    // Notification is best-effort and off the request path.
    let event = match status {
        ApprovalStatus::Approved => ApprovalEvent::Approved,
        ApprovalStatus::Denied => ApprovalEvent::Denied,
        ApprovalStatus::Pending => ApprovalEvent::Created,
    };
    let agent_name = ctx
        .store
        .get_agent(&decided.agent_id)
        .await
        .ok()
        .flatten()
        .map(|a| a.display_name)
        .unwrap_or_else(|| decided.agent_id.clone());
    let payload = WebhookNotifier::payload(event, &decided, &agent_name, ctx.clock.now());
    ctx.webhooks.dispatch(payload, Arc::clone(&ctx.metrics));

    Ok(Json(decided))
}
