//! Request identity.
//!
//! Callers send the shared API key in `x-api-key` and their profile id in `x-user-id`. The
//! expected key is resolved at startup and passed in; nothing here reads the environment.

use reqtrack_core::RecordId;
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing x-api-key header")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("missing x-user-id header")]
    MissingUserId,
    #[error("malformed x-user-id header")]
    InvalidUserId,
}

/// Validates the provided API key against the expected one.
pub fn validate_api_key(expected: &str, provided: Option<&str>) -> Result<(), AuthError> {
    let provided = provided.ok_or(AuthError::MissingApiKey)?;
    if bool::from(expected.as_bytes().ct_eq(provided.trim().as_bytes())) {
        Ok(())
    } else {
        Err(AuthError::InvalidApiKey)
    }
}

/// Parses the caller's profile id header.
pub fn parse_user_id(provided: Option<&str>) -> Result<RecordId, AuthError> {
    let provided = provided.ok_or(AuthError::MissingUserId)?;
    RecordId::parse(provided.trim()).map_err(|_| AuthError::InvalidUserId)
}
