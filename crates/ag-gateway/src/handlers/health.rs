// health.rs — Liveness, readiness, and the metrics export.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::error::GatewayError;

/// GET /health.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "agentguard",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /health/ready — probes the store.
pub async fn ready(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, GatewayError> {
    ctx.store.ping().await?;
    Ok(Json(json!({ "status": "ready" })))
}

/// GET /health/live — static.
pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}

/// GET /metrics — Prometheus text format.
pub async fn metrics(State(ctx): State<Arc<AppContext>>) -> Response {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        ctx.metrics.render(),
    )
        .into_response()
}
