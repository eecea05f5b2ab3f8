// logs.rs — Audit submission, query, and chain verification.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use ag_audit::{verify_entries, AuditEntry, AuditResult, ChainVerification};
use ag_policy::normalize_action;
use ag_store::AuditQuery;

use crate::authgate::Identity;
use crate::context::AppContext;
use crate::engine::new_request_id;
use crate::error::GatewayError;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LogSubmission {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub context: Value,
    /// "success", "denied", "error", or "pending". Defaults to success.
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// POST /logs (agent) — append an application-level entry to the
/// caller's chain. Goes through the same linked append as decisions.
pub async fn submit(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    Json(body): Json<LogSubmission>,
) -> Result<Json<AuditEntry>, GatewayError> {
    let caller = identity.require_agent()?;

    let mut problems = Vec::new();
    if body.action.trim().is_empty() {
        problems.push("action: must not be empty".to_string());
    }
    if body.resource.trim().is_empty() {
        problems.push("resource: must not be empty".to_string());
    }
    let result = match body.result.as_deref() {
        None => AuditResult::Success,
        Some(raw) => match parse_result(raw) {
            Some(result) => result,
            None => {
                problems.push(format!(
                    "result: '{}' is not one of success, denied, error, pending",
                    raw
                ));
                AuditResult::Success
            }
        },
    };
    if !problems.is_empty() {
        return Err(GatewayError::Validation(problems));
    }

    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(new_request_id);

    let entry = AuditEntry::new(
        &caller.agent_id,
        ctx.clock.now(),
        normalize_action(&body.action),
        body.resource.trim(),
        result == AuditResult::Success,
        result,
    )
    .with_context(body.context)
    .with_metadata(body.metadata)
    .with_request_id(request_id);

    let linked = ctx.store.append_audit(entry).await?;
    Ok(Json(linked))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /logs (agent or admin). Agents are pinned to their own chain;
/// admins may filter freely.
pub async fn query(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Value>, GatewayError> {
    let agent_id = match &identity {
        Identity::Agent(agent) => Some(agent.agent_id.clone()),
        Identity::Admin(_) => params.agent_id.clone(),
        Identity::Public { .. } => return Err(GatewayError::Unauthorized),
    };

    let mut problems = Vec::new();
    let result = match params.result.as_deref() {
        None => None,
        Some(raw) => match parse_result(raw) {
            Some(result) => Some(result),
            None => {
                problems.push(format!(
                    "result: '{}' is not one of success, denied, error, pending",
                    raw
                ));
                None
            }
        },
    };
    let since = parse_timestamp(params.since.as_deref(), "since", &mut problems);
    let until = parse_timestamp(params.until.as_deref(), "until", &mut problems);
    if !problems.is_empty() {
        return Err(GatewayError::Validation(problems));
    }

    let entries = ctx
        .store
        .query_audit(AuditQuery {
            agent_id,
            result,
            since,
            until,
            limit: params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
        })
        .await?;

    Ok(Json(json!({
        "count": entries.len(),
        "entries": entries,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// GET /logs/verify?agent_id=… (admin) — walk and recompute the chain.
pub async fn verify(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<VerifyQuery>,
) -> Result<Json<ChainVerification>, GatewayError> {
    identity.require_admin()?;
    let agent_id = params
        .agent_id
        .ok_or_else(|| GatewayError::Validation(vec!["agent_id: required".to_string()]))?;
    let chain = ctx.store.audit_chain(&agent_id).await?;
    Ok(Json(verify_entries(&chain)))
}

fn parse_result(raw: &str) -> Option<AuditResult> {
    match raw {
        "success" => Some(AuditResult::Success),
        "denied" => Some(AuditResult::Denied),
        "error" => Some(AuditResult::Error),
        "pending" => Some(AuditResult::Pending),
        _ => None,
    }
}

fn parse_timestamp(
    raw: Option<&str>,
    field: &str,
    problems: &mut Vec<String>,
) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(_) => {
            problems.push(format!("{}: '{}' is not an RFC 3339 timestamp", field, raw));
            None
        }
    }
}
