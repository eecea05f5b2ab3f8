//! # ag-auth
//!
//! Authentication primitives for AgentGuard: short-lived RS256 bearer
//! tokens, the process signing key pair with its published JWKS document,
//! API-key generation with SHA-256 credential digests, and the admin
//! role model.
//!
//! Revocation and endpoint-class checks are the gate's concern — they
//! need the store and the route. This crate covers the pure steps:
//! signature and expiry on verification, signing and key management on
//! issue.

pub mod claims;
pub mod credential;
pub mod error;
pub mod keys;
pub mod role;
pub mod token;

pub use claims::{TokenClaims, TokenType};
pub use credential::{
    constant_time_eq, generate_secret, secret_hash, secret_prefix, ADMIN_KEY_PREFIX,
    AGENT_KEY_PREFIX,
};
pub use error::AuthError;
pub use keys::{Jwk, Jwks, SigningKeys};
pub use role::Role;
pub use token::TokenService;
