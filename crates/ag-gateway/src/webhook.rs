// webhook.rs — Outbound approval-event notifications.
//
// Delivery is fire-and-forget: the event is handed to a background task
// after the triggering request has already committed its state, a failed
// delivery is retried once and then dropped with a warning. Nothing on
// this path can affect a decision.
//
// When a signing secret is configured every request carries
//   x-agentguard-signature: sha256=<hex(HMAC-SHA256(secret, body))>
// so receivers can authenticate the payload.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use ag_store::ApprovalRequest;

use crate::error::GatewayError;
use crate::metrics::Metrics;

const SIGNATURE_HEADER: &str = "x-agentguard-signature";
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Approval lifecycle events that go out over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalEvent {
    Created,
    Approved,
    Denied,
}

impl ApprovalEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalEvent::Created => "approval.created",
            ApprovalEvent::Approved => "approval.approved",
            ApprovalEvent::Denied => "approval.denied",
        }
    }
}

/// Dispatches approval events to the configured webhook endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Option<reqwest::Client>,
    url: Option<String>,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(
        url: Option<String>,
        secret: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let client = match &url {
            Some(_) => Some(
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(timeout_secs))
                    .build()
                    .map_err(|e| GatewayError::Internal(format!("webhook client: {}", e)))?,
            ),
            None => None,
        };
        Ok(Self {
            client,
            url,
            secret,
        })
    }

    /// Build the wire payload for an event.
    pub fn payload(
        event: ApprovalEvent,
        approval: &ApprovalRequest,
        agent_name: &str,
        now: DateTime<Utc>,
    ) -> Value {
        let mut body = json!({
            "event": event.as_str(),
            "timestamp": now.to_rfc3339(),
            "approval_id": approval.approval_id,
            "agent_id": approval.agent_id,
            "agent_name": agent_name,
            "action": approval.action,
            "resource": approval.resource,
        });
        match event {
            ApprovalEvent::Created => {
                body["context"] = approval.context.clone();
            }
            ApprovalEvent::Approved | ApprovalEvent::Denied => {
                body["decision_reason"] = approval
                    .decision_reason
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                body["decided_by"] = approval
                    .decided_by
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null);
            }
        }
        body
    }

    /// `sha256=<hex>` over the serialized body.
    pub fn signature(secret: &str, body: &[u8]) -> String {
        // HMAC accepts keys of any length; new_from_slice cannot fail.
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    /// Queue an event for delivery. Returns immediately; failures are
    /// logged and counted, never propagated.
    pub fn dispatch(&self, payload: Value, metrics: Arc<Metrics>) {
        let (Some(client), Some(url)) = (self.client.clone(), self.url.clone()) else {
            return;
        };
        let secret = self.secret.clone();

        tokio::spawn(async move {
            let body = payload.to_string();
            for attempt in 0..2 {
                if attempt > 0 {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                let mut request = client
                    .post(&url)
                    .header("content-type", "application/json")
                    .body(body.clone());
                if let Some(secret) = &secret {
                    request = request.header(
                        SIGNATURE_HEADER,
                        WebhookNotifier::signature(secret, body.as_bytes()),
                    );
                }
                match request.send().await {
                    Ok(response) if response.status().is_success() => return,
                    Ok(response) => {
                        tracing::warn!(
                            status = %response.status(),
                            attempt,
                            "webhook delivery rejected"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "webhook delivery failed");
                    }
                }
            }
            Metrics::incr(&metrics.webhook_failures_total);
        });
    }
}
