// api_flow.rs — End-to-end flows against the full router.
//
// Each test builds a fresh in-memory deployment (router + store + fixed
// clock) and drives it over HTTP with tower's oneshot. The fixed clock
// starts on a Tuesday 14:00 UTC so condition-window tests are stable.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use ag_gateway::{router, AppContext, Clock, Config, FixedClock};
use ag_store::{GuardStore, MemoryStore};

const ROOT_ADMIN_KEY: &str = "adk_root_key_for_tests_0123456789";

/// RSA generation is slow; every test shares one signing key.
fn test_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        let (_, pem) = ag_auth::SigningKeys::generate().expect("generate test key");
        pem
    })
}

fn tuesday_afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 2, 14, 0, 0).unwrap()
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
}

fn make_app() -> TestApp {
    let config = Config {
        admin_api_key: Some(ROOT_ADMIN_KEY.to_string()),
        jwt_private_key: Some(test_pem().to_string()),
        ..Default::default()
    };
    config.validate().expect("test config valid");

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(tuesday_afternoon()));
    let ctx = Arc::new(
        AppContext::new(
            config,
            Arc::clone(&store) as Arc<dyn GuardStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .expect("context builds"),
    );
    TestApp {
        router: router(ctx),
        store,
        clock,
    }
}

async fn send(
    router: &Router,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).expect("request builds"))
        .await
        .expect("router responds");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

/// Create an agent via the admin API; returns (agent_id, api_key).
async fn create_agent(app: &TestApp, name: &str, team: &str, env: &str) -> (String, String) {
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/agents",
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(json!({ "display_name": name, "owner_team": team, "environment": env })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create agent: {}", body);
    (
        body["agent_id"].as_str().unwrap().to_string(),
        body["api_key"].as_str().unwrap().to_string(),
    )
}

async fn put_agent_policy(app: &TestApp, agent_id: &str, policy: Value) {
    let (status, body) = send(
        &app.router,
        Method::PUT,
        &format!("/agents/{}/policy", agent_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(policy),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "put policy: {}", body);
}

async fn agent_token(app: &TestApp, api_key: &str) -> String {
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/token",
        &[],
        Some(json!({ "agent_key": api_key })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "token exchange: {}", body);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["expires_in"], 3600);
    body["access_token"].as_str().unwrap().to_string()
}

async fn enforce(app: &TestApp, bearer: &str, action: &str, resource: &str) -> (StatusCode, Value) {
    send(
        &app.router,
        Method::POST,
        "/enforce",
        &[("authorization", &format!("Bearer {}", bearer))],
        Some(json!({ "action": action, "resource": resource, "context": {} })),
    )
    .await
}

#[tokio::test]
async fn allow_rule_end_to_end() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "reader", "t1", "prod").await;
    put_agent_policy(
        &app,
        &agent_id,
        json!({ "allow": [{ "action": "read:file", "resource": "*" }] }),
    )
    .await;

    let token = agent_token(&app, &api_key).await;
    let (status, body) = enforce(&app, &token, "read file", "a.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["reason"], "matched allow rule read:file on *");

    // The audit chain grew by exactly one and verifies.
    let (status, verification) = send(
        &app.router,
        Method::GET,
        &format!("/logs/verify?agent_id={}", agent_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["valid"], true);
    assert_eq!(verification["total_entries"], 1);
    assert_eq!(verification["broken_at"], Value::Null);
}

#[tokio::test]
async fn team_deny_beats_agent_allow() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "reader", "t1", "prod").await;
    put_agent_policy(
        &app,
        &agent_id,
        json!({ "allow": [{ "action": "read:file", "resource": "*" }] }),
    )
    .await;
    let (status, _) = send(
        &app.router,
        Method::PUT,
        "/teams/t1/policy",
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(json!({ "deny": [{ "action": "read:*", "resource": "secret/*" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let token = agent_token(&app, &api_key).await;
    let (status, body) = enforce(&app, &token, "read file", "secret/keys").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "matched deny rule read:* on secret/*");

    // Outside the denied subtree the agent allow still applies.
    let (_, body) = enforce(&app, &token, "read file", "public/readme").await;
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn approval_flow_pending_then_approved() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "dbadmin", "t1", "prod").await;
    put_agent_policy(
        &app,
        &agent_id,
        json!({ "require_approval": [{ "action": "delete:database", "resource": "research_findings" }] }),
    )
    .await;

    let token = agent_token(&app, &api_key).await;
    let (status, body) = enforce(&app, &token, "delete:database", "research_findings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    assert_eq!(body["status"], "pending");
    let approval_id = body["approval_id"].as_str().unwrap().to_string();
    assert!(approval_id.starts_with("ap_"));

    // The agent polls and sees pending.
    let (status, poll) = send(
        &app.router,
        Method::GET,
        &format!("/approvals/{}", approval_id),
        &[("authorization", &format!("Bearer {}", token))],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "pending");

    // The admin queue shows it.
    let (_, listing) = send(
        &app.router,
        Method::GET,
        "/approvals?status=pending",
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(listing["pending_count"], 1);
    assert_eq!(listing["approvals"][0]["approval_id"], approval_id.as_str());

    // Approve, then the poll flips.
    let (status, decided) = send(
        &app.router,
        Method::POST,
        &format!("/approvals/{}/approve", approval_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(json!({ "reason": "cleared with data owner" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["status"], "approved");
    assert_eq!(decided["decided_by"], "adm_root");
    assert!(decided["decided_at"].is_string());

    let (_, poll) = send(
        &app.router,
        Method::GET,
        &format!("/approvals/{}", approval_id),
        &[("authorization", &format!("Bearer {}", token))],
        None,
    )
    .await;
    assert_eq!(poll["status"], "approved");

    // Terminal means terminal: a second decision is 409.
    let (status, body) = send(
        &app.router,
        Method::POST,
        &format!("/approvals/{}/deny", approval_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(json!({ "reason": "too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "approval already decided");
}

#[tokio::test]
async fn deny_requires_a_reason() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "dbadmin", "t1", "prod").await;
    put_agent_policy(
        &app,
        &agent_id,
        json!({ "require_approval": [{ "action": "delete:*" }] }),
    )
    .await;
    let token = agent_token(&app, &api_key).await;
    let (_, body) = enforce(&app, &token, "delete:database", "orders").await;
    let approval_id = body["approval_id"].as_str().unwrap();

    let (status, body) = send(
        &app.router,
        Method::POST,
        &format!("/approvals/{}/deny", approval_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);
}

#[tokio::test]
async fn conditional_rule_follows_utc_clock() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "writer", "t1", "prod").await;
    put_agent_policy(
        &app,
        &agent_id,
        json!({ "allow": [{
            "action": "write:database",
            "resource": "*",
            "conditions": {
                "env": ["prod"],
                "time_range": { "start": "09:00", "end": "18:00" },
                "day_of_week": ["Mon", "Tue", "Wed", "Thu", "Fri"]
            }
        }] }),
    )
    .await;
    let token = agent_token(&app, &api_key).await;

    // Tuesday 14:00 UTC.
    let (_, body) = enforce(&app, &token, "write:database", "orders").await;
    assert_eq!(body["allowed"], true);

    // Saturday 14:00 UTC.
    app.clock
        .set(Utc.with_ymd_and_hms(2026, 6, 6, 14, 0, 0).unwrap());
    let (_, body) = enforce(&app, &token, "write:database", "orders").await;
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "no matching rule");
}

#[tokio::test]
async fn revoked_admin_token_is_rejected() {
    let app = make_app();

    // Exchange the shared admin key for a bearer token.
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/token",
        &[],
        Some(json!({ "admin_key": ROOT_ADMIN_KEY })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expires_in"], 28800);
    let token = body["access_token"].as_str().unwrap().to_string();
    let bearer = format!("Bearer {}", token);

    // The token works.
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/agents",
        &[("authorization", &bearer)],
        Some(json!({ "display_name": "a", "owner_team": "t1", "environment": "dev" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Revoke it.
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/token/revoke",
        &[("authorization", &bearer)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);

    // Every subsequent use is a uniform 401.
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/agents",
        &[("authorization", &bearer)],
        Some(json!({ "display_name": "b", "owner_team": "t1", "environment": "dev" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "invalid or expired token");
}

#[tokio::test]
async fn tampered_entry_is_pinpointed() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "reader", "t1", "prod").await;
    put_agent_policy(
        &app,
        &agent_id,
        json!({ "allow": [{ "action": "read:*" }] }),
    )
    .await;
    let token = agent_token(&app, &api_key).await;
    for resource in ["a.txt", "b.txt", "c.txt"] {
        let (status, _) = enforce(&app, &token, "read:file", resource).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Overwrite a field on the second entry, bypassing the chain.
    assert!(app.store.corrupt_audit_entry(&agent_id, 1, |entry| {
        entry.action = "delete:database".to_string();
    }));
    let tampered_id = app
        .store
        .audit_chain(&agent_id)
        .await
        .unwrap()[1]
        .log_id
        .to_string();

    let (status, verification) = send(
        &app.router,
        Method::GET,
        &format!("/logs/verify?agent_id={}", agent_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["valid"], false);
    assert_eq!(verification["total_entries"], 3);
    assert_eq!(verification["broken_at"], tampered_id.as_str());
}

#[tokio::test]
async fn agent_submitted_logs_join_the_chain() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "reporter", "t1", "prod").await;
    let token = agent_token(&app, &api_key).await;
    let bearer = format!("Bearer {}", token);

    let (status, entry) = send(
        &app.router,
        Method::POST,
        "/logs",
        &[("authorization", &bearer)],
        Some(json!({
            "action": "export report",
            "resource": "weekly.pdf",
            "context": { "rows": 1200 },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", entry);
    assert_eq!(entry["agent_id"], agent_id.as_str());
    assert_eq!(entry["action"], "export:report");
    assert_eq!(entry["result"], "success");
    assert!(entry["chain_hash"].as_str().unwrap().len() == 64);

    // The agent reads back its own entries without naming itself.
    let (status, listing) = send(
        &app.router,
        Method::GET,
        "/logs?limit=10",
        &[("authorization", &bearer)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["entries"][0]["action"], "export:report");
}

#[tokio::test]
async fn auth_and_class_failures() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "reader", "t1", "prod").await;
    put_agent_policy(&app, &agent_id, json!({ "allow": [{ "action": "read:*" }] })).await;
    let token = agent_token(&app, &api_key).await;
    let agent_bearer = format!("Bearer {}", token);

    // Anonymous → 401 uniform.
    let (status, body) = send(&app.router, Method::GET, "/agents", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "unauthorized");

    // Wrong static key → 401 uniform.
    let (status, _) = send(
        &app.router,
        Method::GET,
        "/agents",
        &[("x-admin-key", "adk_wrong")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Agent token on an admin endpoint → 403.
    let (status, body) = send(
        &app.router,
        Method::GET,
        "/agents",
        &[("authorization", &agent_bearer)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "admin token required");

    // Admin key on the agent endpoint → 403.
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/enforce",
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(json!({ "action": "read:file", "resource": "a.txt" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "agent token required");

    // Garbage bearer → 401 uniform token message.
    let (status, body) = send(
        &app.router,
        Method::GET,
        "/agents",
        &[("authorization", "Bearer not.a.token")],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "invalid or expired token");
}

#[tokio::test]
async fn expired_agent_token_is_rejected() {
    let app = make_app();
    let (_, api_key) = create_agent(&app, "reader", "t1", "prod").await;
    let token = agent_token(&app, &api_key).await;

    // Two hours later the 1-hour token is dead.
    app.clock
        .set(tuesday_afternoon() + chrono::Duration::hours(2));
    let (status, body) = enforce(&app, &token, "read:file", "a.txt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "invalid or expired token");
}

#[tokio::test]
async fn deactivated_agent_is_cut_off_but_approvals_survive() {
    let app = make_app();
    let (agent_id, api_key) = create_agent(&app, "dbadmin", "t1", "prod").await;
    put_agent_policy(
        &app,
        &agent_id,
        json!({ "require_approval": [{ "action": "delete:*" }] }),
    )
    .await;
    let token = agent_token(&app, &api_key).await;
    let (_, body) = enforce(&app, &token, "delete:database", "orders").await;
    let approval_id = body["approval_id"].as_str().unwrap().to_string();

    // Deactivate while the approval is pending.
    let (status, body) = send(
        &app.router,
        Method::DELETE,
        &format!("/agents/{}", agent_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    // The live token no longer authenticates, and the key no longer exchanges.
    let (status, _) = enforce(&app, &token, "delete:database", "orders").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/token",
        &[],
        Some(json!({ "agent_key": api_key })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // But the pending approval is still decidable.
    let (status, decided) = send(
        &app.router,
        Method::POST,
        &format!("/approvals/{}/approve", approval_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["status"], "approved");
}

#[tokio::test]
async fn validation_errors_list_fields() {
    let app = make_app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/agents",
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(json!({ "display_name": "", "owner_team": "t1", "environment": "production" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let details = body["detail"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert!(details.iter().any(|d| d.as_str().unwrap().starts_with("display_name:")));
    assert!(details.iter().any(|d| d.as_str().unwrap().starts_with("environment:")));

    // Bad rule patterns are rejected at policy-write time.
    let (agent_id, _) = create_agent(&app, "reader", "t1", "prod").await;
    let (status, body) = send(
        &app.router,
        Method::PUT,
        &format!("/agents/{}/policy", agent_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        Some(json!({ "allow": [{ "action": "read:file", "resource": "secret[" }],
                     "deny": [{ "action": "read:*", "conditions": { "time_range": { "start": "25:00", "end": "26:00" } } }] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let details = body["detail"].as_array().unwrap();
    assert!(details.iter().any(|d| d.as_str().unwrap().starts_with("allow[0]:")));
    assert!(details.iter().any(|d| d.as_str().unwrap().starts_with("deny[0]:")));
}

#[tokio::test]
async fn public_bucket_rate_limits_token_exchange() {
    let app = make_app();
    let mut last = (StatusCode::OK, Value::Null);
    for _ in 0..101 {
        last = send(
            &app.router,
            Method::POST,
            "/token",
            &[("x-forwarded-for", "203.0.113.9")],
            Some(json!({ "agent_key": "agk_wrong" })),
        )
        .await;
        if last.0 == StatusCode::TOO_MANY_REQUESTS {
            break;
        }
        assert_eq!(last.0, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(last.0, StatusCode::TOO_MANY_REQUESTS);
    assert!(last.1["retry_after"].as_u64().unwrap() > 0);

    // Another client IP is unaffected.
    let (status, _) = send(
        &app.router,
        Method::POST,
        "/token",
        &[("x-forwarded-for", "203.0.113.10")],
        Some(json!({ "agent_key": "agk_wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn jwks_and_health_are_open() {
    let app = make_app();

    let (status, jwks) = send(
        &app.router,
        Method::GET,
        "/.well-known/jwks.json",
        &[],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let key = &jwks["keys"][0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["use"], "sig");
    assert!(key["n"].is_string());
    assert_eq!(key["e"], "AQAB");

    for path in ["/health", "/health/ready", "/health/live"] {
        let (status, _) = send(&app.router, Method::GET, path, &[], None).await;
        assert_eq!(status, StatusCode::OK, "{}", path);
    }

    let (status, text) = send(&app.router, Method::GET, "/metrics", &[], None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.as_str().unwrap().contains("agentguard_requests_total"));
}

#[tokio::test]
async fn policy_round_trips_through_the_api() {
    let app = make_app();
    let (agent_id, _) = create_agent(&app, "reader", "t1", "prod").await;
    let policy = json!({
        "allow": [{ "action": "read:file", "resource": "*" }],
        "deny": [{ "action": "delete:*", "resource": "prod/*",
                   "conditions": { "env": ["prod"], "day_of_week": ["Sat", "Sun"] } }],
        "require_approval": [{ "action": "write:database" }]
    });
    put_agent_policy(&app, &agent_id, policy).await;

    let (status, stored) = send(
        &app.router,
        Method::GET,
        &format!("/agents/{}/policy", agent_id),
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["agent_id"], agent_id.as_str());
    // The author's form is preserved verbatim — no normalization at rest.
    assert_eq!(stored["allow"][0]["action"], "read:file");
    assert_eq!(stored["deny"][0]["conditions"]["env"][0], "prod");
    assert_eq!(stored["require_approval"][0]["action"], "write:database");
    assert!(stored["require_approval"][0].get("resource").is_none());

    // Unknown agent → 404.
    let (status, _) = send(
        &app.router,
        Method::GET,
        "/agents/agt_missing/policy",
        &[("x-admin-key", ROOT_ADMIN_KEY)],
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
