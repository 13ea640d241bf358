//! HTTP handlers, grouped by resource.

pub mod catalog;
pub mod drafts;
pub mod files;
pub mod health;
pub mod requisitions;
pub mod users;

use crate::error::ApiResult;
use reqtrack_core::{CoreError, RecordId};

/// Parses a record id taken from the URL path.
fn parse_id(value: &str) -> ApiResult<RecordId> {
    RecordId::parse(value).map_err(|e| CoreError::from(e).into())
}
