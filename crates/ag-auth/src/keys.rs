// keys.rs — Signing key pair lifecycle and the JWKS document.
//
// The RS256 signing key is loaded from configuration at startup. When no
// key is configured, a fresh RSA-2048 pair is generated for the process
// lifetime; the caller is expected to emit the returned PEM to the
// operator log exactly once, with the warning that every token dies on
// restart. The private half is read-only after construction.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

const KEY_BITS: usize = 2048;

/// One public key in the verification key set.
#[derive(Debug, Clone, Serialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub usage: String,
    pub alg: String,
    pub kid: String,
    /// Modulus, base64url without padding.
    pub n: String,
    /// Public exponent, base64url without padding.
    pub e: String,
}

/// The verification key set published at /.well-known/jwks.json.
#[derive(Debug, Clone, Serialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// The process signing key pair plus the derived verification material.
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    kid: String,
    jwk: Jwk,
}

impl SigningKeys {
    /// Load from an operator-supplied private key PEM (PKCS#8 or PKCS#1).
    pub fn from_pem(pem: &str) -> Result<Self, AuthError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AuthError::Key(format!("unreadable private key: {}", e)))?;
        Self::from_private(private, pem.as_bytes())
    }

    /// Generate a fresh RSA-2048 pair for the process lifetime.
    ///
    /// Returns the keys and the private PEM; the caller logs the PEM once
    /// so the operator can pin it before the next restart.
    pub fn generate() -> Result<(Self, String), AuthError> {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, KEY_BITS)
            .map_err(|e| AuthError::Key(format!("key generation failed: {}", e)))?;
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::Key(format!("PEM encoding failed: {}", e)))?;
        let keys = Self::from_private(private, pem.as_bytes())?;
        Ok((keys, pem.to_string()))
    }

    fn from_private(private: RsaPrivateKey, pem: &[u8]) -> Result<Self, AuthError> {
        let public: RsaPublicKey = private.to_public_key();

        let der = public
            .to_public_key_der()
            .map_err(|e| AuthError::Key(format!("DER encoding failed: {}", e)))?;
        // Stable fingerprint of the public key; survives restarts for
        // externally supplied keys.
        let kid = hex::encode(Sha256::digest(der.as_bytes()))[..16].to_string();

        let n = URL_SAFE_NO_PAD.encode(public.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public.e().to_bytes_be());

        let encoding = EncodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthError::Key(format!("unusable private key: {}", e)))?;
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| AuthError::Key(format!("unusable public key: {}", e)))?;

        Ok(Self {
            encoding,
            decoding,
            kid: kid.clone(),
            jwk: Jwk {
                kty: "RSA".to_string(),
                usage: "sig".to_string(),
                alg: "RS256".to_string(),
                kid,
                n,
                e,
            },
        })
    }

    pub fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The publishable verification key set.
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.jwk.clone()],
        }
    }
}
