// metrics.rs — Process-local counters with Prometheus text export.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters incremented on the request path. Reads and writes are
/// relaxed — these are monotonic tallies, not synchronization points.
#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub auth_failures_total: AtomicU64,
    pub rate_limited_total: AtomicU64,
    pub decisions_allow: AtomicU64,
    pub decisions_deny: AtomicU64,
    pub decisions_pending: AtomicU64,
    pub decisions_error: AtomicU64,
    pub approvals_opened: AtomicU64,
    pub approvals_decided: AtomicU64,
    pub webhook_failures_total: AtomicU64,
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        format!(
            "# HELP agentguard_requests_total Total HTTP requests handled\n\
             # TYPE agentguard_requests_total counter\n\
             agentguard_requests_total {}\n\
             # HELP agentguard_auth_failures_total Requests rejected at the auth gate\n\
             # TYPE agentguard_auth_failures_total counter\n\
             agentguard_auth_failures_total {}\n\
             # HELP agentguard_rate_limited_total Requests rejected by a rate bucket\n\
             # TYPE agentguard_rate_limited_total counter\n\
             agentguard_rate_limited_total {}\n\
             # HELP agentguard_decisions_total Policy decisions by verdict\n\
             # TYPE agentguard_decisions_total counter\n\
             agentguard_decisions_total{{verdict=\"allow\"}} {}\n\
             agentguard_decisions_total{{verdict=\"deny\"}} {}\n\
             agentguard_decisions_total{{verdict=\"pending\"}} {}\n\
             agentguard_decisions_total{{verdict=\"error\"}} {}\n\
             # HELP agentguard_approvals_total Approval requests opened and decided\n\
             # TYPE agentguard_approvals_total counter\n\
             agentguard_approvals_total{{event=\"opened\"}} {}\n\
             agentguard_approvals_total{{event=\"decided\"}} {}\n\
             # HELP agentguard_webhook_failures_total Webhook deliveries that failed after retry\n\
             # TYPE agentguard_webhook_failures_total counter\n\
             agentguard_webhook_failures_total {}\n",
            get(&self.requests_total),
            get(&self.auth_failures_total),
            get(&self.rate_limited_total),
            get(&self.decisions_allow),
            get(&self.decisions_deny),
            get(&self.decisions_pending),
            get(&self.decisions_error),
            get(&self.approvals_opened),
            get(&self.approvals_decided),
            get(&self.webhook_failures_total),
        )
    }
}
