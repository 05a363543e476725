//! Identity token verification
//!
//! Tokens are HS256 JWTs issued by the identity service. The `sub` claim
//! carries the numeric user id and `exp` is always enforced with no leeway.
//!
//! This module contains only pure functions; HTTP extraction lives in the
//! service crate.

use crate::db::UserId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiAuthError {
    /// No token was presented
    #[error("Missing identity token")]
    MissingToken,

    /// Token signature was valid but `exp` has passed
    #[error("Token expired")]
    Expired,

    /// Signature, algorithm, issuer or structure rejected
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// `sub` claim is not a numeric user id
    #[error("Invalid token subject: {0}")]
    InvalidSubject(String),
}

/// Claims carried by an identity token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Verifies identity tokens against a shared HS256 secret
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn hs256(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = issuer.filter(|s| !s.is_empty()) {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify a token and return the user id it identifies
    pub fn verify(&self, token: &str) -> Result<UserId, ApiAuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiAuthError::MissingToken);
        }

        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => ApiAuthError::Expired,
                _ => ApiAuthError::InvalidToken(e.to_string()),
            },
        )?;

        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| ApiAuthError::InvalidSubject(data.claims.sub.clone()))
    }
}

/// Mint a token for `user_id` valid for `ttl`
///
/// Issuance belongs to the identity service; this exists for tests and local
/// tooling that need tokens the verifier accepts.
pub fn issue_token(
    secret: &str,
    user_id: UserId,
    ttl: chrono::Duration,
    issuer: Option<&str>,
) -> Result<String, ApiAuthError> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp(),
        iss: issuer.map(str::to_string),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiAuthError::InvalidToken(e.to_string()))
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    header_value
        .trim()
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
