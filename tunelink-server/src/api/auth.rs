//! Bearer-token authentication for HTTP routes

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tunelink_common::api::{parse_bearer, ApiAuthError};
use tunelink_common::db::UserId;

use crate::db::users;
use crate::error::Error;
use crate::AppState;

/// The verified caller of a protected route
///
/// Rejects with 401 when the header is missing or the token does not verify,
/// and when the token names a user that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_bearer)
            .ok_or(ApiAuthError::MissingToken)?;

        let user_id = state.verifier.verify(token)?;

        if !users::user_exists(&state.db, user_id).await? {
            return Err(Error::Unauthorized(format!("unknown user {}", user_id)));
        }

        Ok(AuthUser(user_id))
    }
}
