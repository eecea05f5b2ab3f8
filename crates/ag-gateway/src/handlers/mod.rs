// handlers — One module per resource. Request/response types are plain
// serde structs; every handler returns Result<_, GatewayError> so the
// status mapping lives in one place.

pub mod agents;
pub mod approvals;
pub mod enforce;
pub mod health;
pub mod logs;
pub mod policies;
pub mod tokens;
