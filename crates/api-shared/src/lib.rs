//! # API Shared
//!
//! Shared definitions for the requisition tracker API.
//!
//! Contains:
//! - Wire types (`dto` module) with OpenAPI schemas and conversions from core types
//! - Shared services like `HealthService`
//! - Request identity checks (API key and user id headers)

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{AuthError, API_KEY_HEADER, USER_ID_HEADER};
pub use health::HealthService;
