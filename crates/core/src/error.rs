use crate::workflow::RequisitionStatus;
use serde::{Deserialize, Serialize};

/// A validation failure attached to one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{collection} record not found: {id}")]
    NotFound {
        collection: &'static str,
        id: String,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("cannot move a requisition from {from} to {to}")]
    InvalidTransition {
        from: RequisitionStatus,
        to: RequisitionStatus,
    },

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write document: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read document: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("document {} does not match its schema: {message}", .path.display())]
    DocumentSchema {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("invalid id: {0}")]
    Id(#[from] reqtrack_uuid::IdError),
    #[error("invalid text: {0}")]
    Text(#[from] reqtrack_types::TextError),
    #[error("attachment storage error: {0}")]
    Files(#[from] reqtrack_files::FilesError),
}

impl CoreError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation(vec![FieldError::new(field, message)])
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
