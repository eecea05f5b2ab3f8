// routes.rs — The HTTP surface as one explicit table.
//
// Auth class and rate bucket per route. "open" routes bypass the gate
// entirely; everything else is authenticated and admitted by it, and the
// handler enforces the class with identity.require_*():
//
//   method path                      auth class      bucket
//   ------ ------------------------ --------------- -----------
//   GET    /health[,/ready,/live]   none            —
//   GET    /.well-known/jwks.json   none            —
//   GET    /metrics                 internal        —
//   POST   /token                   none            public
//   POST   /token/revoke            bearer          by identity
//   POST   /agents                  admin (write)   admin-write
//   GET    /agents                  admin           admin-read
//   GET    /agents/{id}             admin           admin-read
//   DELETE /agents/{id}             admin (write)   admin-write
//   PUT    /agents/{id}/policy      admin (write)   admin-write
//   GET    /agents/{id}/policy      admin           admin-read
//   PUT    /teams/{team}/policy     admin (write)   admin-write
//   GET    /teams/{team}/policy     admin           admin-read
//   POST   /enforce                 agent           enforce
//   POST   /logs                    agent           logs
//   GET    /logs                    agent or admin  logs / admin-read
//   GET    /logs/verify             admin           admin-read
//   GET    /approvals               admin           admin-read
//   GET    /approvals/{id}          agent or admin  enforce / admin-read
//   POST   /approvals/{id}/approve  admin ≥approver admin-write
//   POST   /approvals/{id}/deny     admin ≥approver admin-write

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::authgate;
use crate::context::AppContext;
use crate::error::GatewayError;
use crate::handlers::{agents, approvals, enforce, health, logs, policies, tokens};

/// Build the full application router.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let open = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/.well-known/jwks.json", get(tokens::jwks))
        .route("/metrics", get(health::metrics));

    let guarded: Router<Arc<AppContext>> = Router::new()
        .route("/token", post(tokens::exchange))
        .route("/token/revoke", post(tokens::revoke))
        .route("/agents", post(agents::create).get(agents::list))
        .route("/agents/{id}", get(agents::get).delete(agents::deactivate))
        .route(
            "/agents/{id}/policy",
            put(policies::put_agent_policy).get(policies::get_agent_policy),
        )
        .route(
            "/teams/{team}/policy",
            put(policies::put_team_policy).get(policies::get_team_policy),
        )
        .route("/enforce", post(enforce::enforce))
        .route("/logs", post(logs::submit).get(logs::query))
        .route("/logs/verify", get(logs::verify))
        .route("/approvals", get(approvals::list))
        .route("/approvals/{id}", get(approvals::get))
        .route("/approvals/{id}/approve", post(approvals::approve))
        .route("/approvals/{id}/deny", post(approvals::deny))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&ctx),
            authgate::gate,
        ));

    open.merge(guarded)
        .layer(cors_layer(&ctx.config.cors_origins))
        .with_state(ctx)
}

/// Bind and serve until a shutdown signal arrives.
pub async fn serve(ctx: Arc<AppContext>) -> Result<(), GatewayError> {
    let addr = ctx
        .config
        .socket_addr()
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    let app = router(Arc::clone(&ctx));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Internal(format!("bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "agentguard listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| GatewayError::Internal(format!("server error: {}", e)))
}

async fn shutdown_signal() {
    // Ctrl-C or SIGTERM from the orchestrator; either way drain and stop.
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn cors_layer(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let list: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(list)
        .allow_methods(Any)
        .allow_headers(Any)
}
