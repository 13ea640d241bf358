//! Request identity extractors.

use crate::error::ApiError;
use crate::AppState;
use api_shared::auth::{parse_user_id, validate_api_key};
use api_shared::{API_KEY_HEADER, USER_ID_HEADER};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use reqtrack_core::Actor;

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Proof that the request carried the shared API key.
pub struct ApiKey;

#[async_trait]
impl FromRequestParts<AppState> for ApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        validate_api_key(&state.api_key, header(parts, API_KEY_HEADER))?;
        Ok(ApiKey)
    }
}

/// The authenticated caller, resolved from the API key and the `x-user-id` profile.
pub struct Caller(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        validate_api_key(&state.api_key, header(parts, API_KEY_HEADER))?;
        let user_id = parse_user_id(header(parts, USER_ID_HEADER))?;
        let actor = state.services.users.actor_for(&user_id)?;
        tracing::debug!(user_id = %user_id, role = %actor.role, "caller resolved");
        Ok(Caller(actor))
    }
}
