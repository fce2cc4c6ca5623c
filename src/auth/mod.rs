//! Authentication boundary: session tokens for owners, admin key for the
//! admin surface.
//!
//! Session issuance lives outside this service; tokens are only verified
//! here. `issue_session_token` exists for the developer CLI and tests.

mod extractor;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::SESSION_ISSUER;
use crate::models::SessionClaims;

pub use extractor::{AdminAuth, AuthError, RequestContext};

/// Wrapper type for the admin key.
/// Uses `SecretString` so the key never shows up in logs and is zeroized on drop.
#[derive(Clone)]
pub struct AdminKey(Option<SecretString>);

impl AdminKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.map(SecretString::from))
    }

    /// Constant-time comparison with the configured key.
    ///
    /// Unequal lengths compare false without an early exit.
    pub fn verify(&self, provided: &str) -> bool {
        match &self.0 {
            Some(secret) => secret
                .expose_secret()
                .as_bytes()
                .ct_eq(provided.as_bytes())
                .into(),
            None => false,
        }
    }
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(_) => write!(f, "AdminKey([REDACTED])"),
            None => write!(f, "AdminKey(None)"),
        }
    }
}

/// Secret used to verify session tokens.
#[derive(Clone)]
pub struct SessionSecret(SecretString);

impl SessionSecret {
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }

    /// Verify a session token and return its claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, String> {
        let key = DecodingKey::from_secret(self.0.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.validate_aud = false;

        let token_data = decode::<SessionClaims>(token, &key, &validation)
            .map_err(|e| format!("Invalid session token: {}", e))?;

        Ok(token_data.claims)
    }
}

/// Mint a session token the way the external auth service does.
pub fn issue_session_token(
    secret: &SecretString,
    user_id: Uuid,
    username: &str,
    role: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + chrono::Duration::seconds(ttl_secs);

    let claims = SessionClaims {
        sub: user_id.to_string(),
        iss: SESSION_ISSUER.to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
        username: username.to_string(),
        role: role.to_string(),
    };

    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    encode(&Header::default(), &claims, &key)
}
