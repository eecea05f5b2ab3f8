// context.rs — Application context: every shared resource, built once.
//
// Construction order: signing keys → token service → rate limiter →
// webhook notifier → decision engine. Handlers receive the whole
// context as axum state; nothing reaches around it for globals.
// Teardown is the reverse drop order, which Rust handles.

use std::sync::Arc;

use ag_auth::{generate_secret, SigningKeys, TokenService, ADMIN_KEY_PREFIX};
use ag_store::GuardStore;

use crate::clock::Clock;
use crate::config::Config;
use crate::engine::DecisionEngine;
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::ratelimit::{MemoryCounterStore, RateLimiter};
use crate::webhook::WebhookNotifier;

/// The id the process-wide shared admin key authenticates as.
pub const IMPLICIT_ADMIN_ID: &str = "adm_root";

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn GuardStore>,
    pub clock: Arc<dyn Clock>,
    pub tokens: TokenService,
    pub limiter: RateLimiter,
    pub webhooks: WebhookNotifier,
    pub engine: DecisionEngine,
    pub metrics: Arc<Metrics>,
    /// Resolved shared admin secret (configured, or generated at startup).
    pub admin_api_key: String,
}

impl AppContext {
    /// Assemble the context. Emits one-time operator warnings when key
    /// material had to be generated for this process lifetime.
    pub fn new(
        config: Config,
        store: Arc<dyn GuardStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        let keys = match &config.jwt_private_key {
            Some(pem) => SigningKeys::from_pem(pem)
                .map_err(|e| GatewayError::Internal(format!("jwt_private_key: {}", e)))?,
            None => {
                let (keys, pem) = SigningKeys::generate()
                    .map_err(|e| GatewayError::Internal(format!("key generation: {}", e)))?;
                tracing::warn!(
                    "no jwt_private_key configured; generated an ephemeral RSA-2048 key pair. \
                     ALL TOKENS WILL BE INVALIDATED ON RESTART. Pin this key via \
                     AGENTGUARD_JWT_PRIVATE_KEY to keep tokens valid:\n{}",
                    pem
                );
                keys
            }
        };
        let tokens = TokenService::new(
            keys,
            config.jwt_agent_expire_seconds,
            config.jwt_admin_expire_seconds,
        );

        let admin_api_key = match &config.admin_api_key {
            Some(key) => key.clone(),
            None => {
                let key = generate_secret(ADMIN_KEY_PREFIX);
                tracing::warn!(
                    "no admin_api_key configured; generated one for this process: {}",
                    key
                );
                key
            }
        };

        let limiter = RateLimiter::new(
            config.rate_limit_enabled,
            Arc::new(MemoryCounterStore::default()),
        );
        let webhooks = WebhookNotifier::new(
            config.webhook_url.clone(),
            config.webhook_secret.clone(),
            config.request_timeout,
        )?;
        let engine = DecisionEngine::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.request_timeout,
        );

        Ok(Self {
            config,
            store,
            clock,
            tokens,
            limiter,
            webhooks,
            engine,
            metrics: Arc::new(Metrics::default()),
            admin_api_key,
        })
    }
}
