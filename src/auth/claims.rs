use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload used for authentication. `jti` identifies the session row
/// in `auth_tokens`, which is what makes the token revocable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub jti: Uuid,   // token ID, matches an auth_tokens row
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}
