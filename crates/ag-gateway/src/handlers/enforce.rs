// enforce.rs — The enforcement endpoint.
//
// The server never suspends: a require_approval match returns Pending
// immediately and the agent polls GET /approvals/{id} to completion.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::authgate::Identity;
use crate::context::AppContext;
use crate::engine::{new_request_id, Verdict};
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::webhook::{ApprovalEvent, WebhookNotifier};

#[derive(Debug, Deserialize)]
pub struct EnforceRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub context: Value,
}

/// POST /enforce (agent).
pub async fn enforce(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    Json(body): Json<EnforceRequest>,
) -> Result<Response, GatewayError> {
    let caller = identity.require_agent()?;

    let mut problems = Vec::new();
    if body.action.trim().is_empty() {
        problems.push("action: must not be empty".to_string());
    }
    if body.resource.trim().is_empty() {
        problems.push("resource: must not be empty".to_string());
    }
    if !problems.is_empty() {
        return Err(GatewayError::Validation(problems));
    }

    // The gate already rejected inactive agents; re-read so the decision
    // sees current team/environment.
    let agent = ctx
        .store
        .get_agent(&caller.agent_id)
        .await?
        .filter(|a| a.is_active)
        .ok_or(GatewayError::InvalidToken)?;

    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(new_request_id);

    let decision = ctx
        .engine
        .decide(&agent, &body.action, &body.resource, body.context, &request_id)
        .await?;

    if decision.degraded {
        Metrics::incr(&ctx.metrics.decisions_error);
        let Verdict::Deny { reason } = &decision.verdict else {
            return Err(GatewayError::Internal("degraded non-deny verdict".into()));
        };
        // Default deny was applied and audited; the caller sees 503.
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": reason })),
        )
            .into_response());
    }

    let body = match decision.verdict {
        Verdict::Allow { reason } => {
            Metrics::incr(&ctx.metrics.decisions_allow);
            json!({ "allowed": true, "reason": reason })
        }
        Verdict::Deny { reason } => {
            Metrics::incr(&ctx.metrics.decisions_deny);
            json!({ "allowed": false, "reason": reason })
        }
        Verdict::Pending { approval_id } => {
            Metrics::incr(&ctx.metrics.decisions_pending);
            Metrics::incr(&ctx.metrics.approvals_opened);
            if let Some(approval) = &decision.approval {
                let payload = WebhookNotifier::payload(
                    ApprovalEvent::Created,
                    approval,
                    &agent.display_name,
                    ctx.clock.now(),
                );
                ctx.webhooks.dispatch(payload, Arc::clone(&ctx.metrics));
            }
            json!({
                "allowed": false,
                "status": "pending",
                "approval_id": approval_id,
            })
        }
    };
    Ok(Json(body).into_response())
}
