// token.rs — Token issue and ordered verification.
//
// Verification order is contractual: (1) signature, (2) expiry,
// (3) revocation, (4) endpoint class. Steps 1–2 live here; the gate
// performs 3 (needs the store) and 4 (needs the route).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use uuid::Uuid;

use crate::claims::{TokenClaims, TokenType};
use crate::error::AuthError;
use crate::keys::SigningKeys;
use crate::role::Role;

/// Signs and verifies bearer tokens against the process key pair.
pub struct TokenService {
    keys: SigningKeys,
    agent_ttl: Duration,
    admin_ttl: Duration,
}

impl TokenService {
    pub fn new(keys: SigningKeys, agent_ttl_seconds: i64, admin_ttl_seconds: i64) -> Self {
        Self {
            keys,
            agent_ttl: Duration::seconds(agent_ttl_seconds),
            admin_ttl: Duration::seconds(admin_ttl_seconds),
        }
    }

    /// Issue a token for an agent identity.
    pub fn issue_agent(
        &self,
        agent_id: &str,
        env: &str,
        team: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, TokenClaims), AuthError> {
        let claims = TokenClaims {
            sub: agent_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.agent_ttl).timestamp(),
            token_type: TokenType::Agent,
            env: Some(env.to_string()),
            team: Some(team.to_string()),
            role: None,
        };
        Ok((self.sign(&claims)?, claims))
    }

    /// Issue a token for an admin identity.
    pub fn issue_admin(
        &self,
        admin_id: &str,
        role: Role,
        team: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(String, TokenClaims), AuthError> {
        let claims = TokenClaims {
            sub: admin_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.admin_ttl).timestamp(),
            token_type: TokenType::Admin,
            env: None,
            team: team.map(|t| t.to_string()),
            role: Some(role),
        };
        Ok((self.sign(&claims)?, claims))
    }

    /// Validate signature and expiry, returning the claims.
    ///
    /// Expiry is checked here rather than delegated to the JWT library so
    /// the signature-before-expiry order holds and the clock is injectable.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<TokenClaims>(token, self.keys.decoding(), &validation)
            .map_err(|_| AuthError::InvalidToken)?;

        if data.claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(data.claims)
    }

    /// Seconds until an agent token issued now would expire.
    pub fn agent_expires_in(&self) -> i64 {
        self.agent_ttl.num_seconds()
    }

    /// Seconds until an admin token issued now would expire.
    pub fn admin_expires_in(&self) -> i64 {
        self.admin_ttl.num_seconds()
    }

    /// The verification key set for the well-known endpoint.
    pub fn jwks(&self) -> crate::keys::Jwks {
        self.keys.jwks()
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid().to_string());
        encode(&header, claims, self.keys.encoding())
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}
