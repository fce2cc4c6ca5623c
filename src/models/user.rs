//! Session token claims issued by the external auth service.

use serde::{Deserialize, Serialize};

/// JWT claims carried by session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iss: String,
    pub exp: usize,
    pub iat: usize,
    pub username: String,
    pub role: String,
}
