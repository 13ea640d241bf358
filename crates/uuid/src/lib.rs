//! Record identifiers and sharded-path utilities.
//!
//! Every document in the requisition tracker's store is keyed by a *canonical* identifier:
//! **32 lowercase hexadecimal characters** (a UUID v4 without hyphens).
//!
//! This crate provides:
//! - [`RecordId`], a wrapper that guarantees the canonical format once constructed.
//! - The sharding rule used to derive a record's directory inside a collection.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Identifiers that arrive from outside (path segments, JSON bodies, CLI arguments) must already
//! be canonical; [`RecordId::parse`] rejects hyphenated or uppercase forms rather than
//! normalising them.
//!
//! ## Sharded directory layout
//! For a canonical id `u`, a collection stores the record under:
//! `collection_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `reqtrack_data/requisitions/55/0e/550e8400e29b41d4a716446655440000/`

mod record_id;

pub use record_id::{RecordId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
