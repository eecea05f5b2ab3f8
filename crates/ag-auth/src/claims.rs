// claims.rs — Bearer token claims.

use serde::{Deserialize, Serialize};

use crate::role::Role;

/// Which class of identity a token carries. Determines which endpoint
/// classes accept it and which expiry window applied at issue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Agent,
    Admin,
}

/// The claim set signed into every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Subject: the agent or admin id.
    pub sub: String,
    /// Unique token id, the key into the revocation set.
    pub jti: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Identity class.
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Agent tokens: the agent's environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Owning team, when one is pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Admin tokens: the admin's role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}
