//! Bearer token verification.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

/// Claims carried by tokens minted on the issuance path.
///
/// Only expiry is enforced here; everything else is opaque payload for
/// the business collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub exp: u64,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Split an `Authorization` header into its credential part.
///
/// The header must be exactly two space-separated tokens (scheme +
/// credential); anything else counts as a missing token.
pub fn parse_authorization(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::TokenMissing)?;
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        [_scheme, credential] => Ok(credential),
        _ => Err(AuthError::TokenMissing),
    }
}

/// Verify a credential as a signed, time-bound token.
///
/// Any verification failure (bad signature, malformed, past expiry) maps
/// to [`AuthError::TokenExpired`], matching the single rejection realm
/// the clients expect.
pub fn verify_token(credential: &str, secret: &str) -> Result<TokenClaims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<TokenClaims>(
        credential,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::TokenExpired)
}
