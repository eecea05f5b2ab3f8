// entry.rs — Audit entry data model and canonical serialization.
//
// Each entry records one decision or agent-submitted event. The chain
// hash is computed over a canonical serialization of the entry WITHOUT
// the chain_hash field: keys in lexicographic order, timestamps as
// ISO-8601 UTC with microsecond precision, nested context/metadata
// objects in deterministic key order, and the literal string "null"
// standing in for an absent prev_log_id. Re-serializing a stored entry
// must reproduce the exact bytes that were hashed, or verification
// would report false tampering.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The recorded outcome of the call that produced an entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    /// The action was allowed.
    Success,
    /// The action was denied by policy.
    Denied,
    /// A dependency failed; the safe default applied.
    Error,
    /// The action is suspended awaiting human approval.
    Pending,
}

impl AuditResult {
    fn as_str(self) -> &'static str {
        match self {
            AuditResult::Success => "success",
            AuditResult::Denied => "denied",
            AuditResult::Error => "error",
            AuditResult::Pending => "pending",
        }
    }
}

/// One link in an agent's audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier for this entry.
    pub log_id: Uuid,

    /// The agent this entry belongs to. Chains are per-agent.
    pub agent_id: String,

    /// When the entry was written (UTC).
    pub timestamp: DateTime<Utc>,

    /// Normalized action that was evaluated.
    pub action: String,

    /// Target resource.
    pub resource: String,

    /// Caller-supplied request context.
    #[serde(default)]
    pub context: Value,

    /// Whether the action was permitted.
    pub allowed: bool,

    /// Outcome classification.
    pub result: AuditResult,

    /// Engine metadata: matched rule position, approval id, failure detail.
    #[serde(default)]
    pub metadata: Value,

    /// Correlation id of the HTTP request that produced this entry.
    pub request_id: Option<String>,

    /// The previous entry in this agent's chain; None for the first entry.
    pub prev_log_id: Option<Uuid>,

    /// SHA-256 over the predecessor's chain hash and this entry's
    /// canonical serialization. Filled in by the storage layer at append.
    pub chain_hash: String,
}

impl AuditEntry {
    /// Create an entry with a fresh id, unlinked. The storage layer links
    /// it into the agent's chain at append time.
    pub fn new(
        agent_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        action: impl Into<String>,
        resource: impl Into<String>,
        allowed: bool,
        result: AuditResult,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            timestamp,
            action: action.into(),
            resource: resource.into(),
            context: Value::Null,
            allowed,
            result,
            metadata: Value::Null,
            request_id: None,
            prev_log_id: None,
            chain_hash: String::new(),
        }
    }

    /// Set the caller context and return self (builder pattern).
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Set engine metadata and return self.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the correlating request id and return self.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The canonical serialization of this entry, excluding `chain_hash`.
    ///
    /// serde_json's default map is ordered by key, so building a single
    /// object yields lexicographic key order for the entry itself and for
    /// any nested context/metadata objects that came in through serde.
    pub fn canonical_serialize(&self) -> String {
        let mut doc = serde_json::Map::new();
        doc.insert("action".into(), Value::String(self.action.clone()));
        doc.insert("agent_id".into(), Value::String(self.agent_id.clone()));
        doc.insert("allowed".into(), Value::Bool(self.allowed));
        doc.insert("context".into(), self.context.clone());
        doc.insert("log_id".into(), Value::String(self.log_id.to_string()));
        doc.insert("metadata".into(), self.metadata.clone());
        doc.insert(
            "prev_log_id".into(),
            Value::String(
                self.prev_log_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "null".to_string()),
            ),
        );
        doc.insert(
            "request_id".into(),
            match &self.request_id {
                Some(id) => Value::String(id.clone()),
                None => Value::Null,
            },
        );
        doc.insert("resource".into(), Value::String(self.resource.clone()));
        doc.insert("result".into(), Value::String(self.result.as_str().into()));
        doc.insert(
            "timestamp".into(),
            Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Value::Object(doc).to_string()
    }
}
