//! Requisition attachment storage.
//!
//! Supporting images for a requisition are stored in one folder per requisition, either on the
//! local filesystem or in a cloud drive. Both backends accept the same inputs and return the same
//! metadata so callers never branch on where the bytes went.
//!
//! ## Naming
//!
//! Uploads are keyed by a client-generated identifier embedded in the file name:
//!
//! ```text
//! <folder>/
//! └── <client_id>__<sanitised original name>
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use reqtrack_files::{AttachmentStore, ClientFileName, LocalStore};
//! use std::path::Path;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = AttachmentStore::Local(LocalStore::new(Path::new("reqtrack_data/uploads"))?);
//! let name = ClientFileName::parse("k3j4h5g6__scan.jpg")?;
//! let stored = store.upload("20240307-A1B2C3", &name, vec![0xff, 0xd8]).await?;
//! println!("stored at {}", stored.reference);
//! # Ok(())
//! # }
//! ```

mod constants;
mod drive;
mod local;
mod naming;

pub use constants::{
    DEFAULT_DRIVE_API_URL, DEFAULT_DRIVE_AUTH_URL, DEFAULT_DRIVE_CONTENT_URL,
    DEFAULT_DRIVE_ROOT_FOLDER,
};
pub use drive::{DriveClient, DriveConfig};
pub use local::LocalStore;
pub use naming::{validate_folder, ClientFileName};

use chrono::{DateTime, Utc};

/// Errors that can occur during attachment operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Path validation failed (potential directory traversal or unsafe path)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Folder or file name does not follow the upload naming rules
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("File not found: {0}")]
    NotFound(String),

    /// The drive rejected the OAuth refresh-token exchange
    #[error("Drive authentication failed: {0}")]
    Auth(String),

    /// The drive answered with a non-success status
    #[error("Drive request failed with status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FilesError {
    /// True for errors caused by the caller's input rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FilesError::InvalidName(_) | FilesError::InvalidPath(_) | FilesError::NotFound(_)
        )
    }
}

/// Metadata for a stored attachment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    /// Folder the attachment was stored in.
    pub folder: String,
    /// Stored file name (`<client_id>__<original>`).
    pub file_name: String,
    pub client_id: String,
    pub original_name: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the uploaded bytes.
    pub sha256: String,
    /// Sniffed media type; best effort, `None` when the content is not recognised.
    pub media_type: Option<String>,
    /// Backend-qualified location, `local:<folder>/<file>` or `drive:<path>`.
    pub reference: String,
    pub stored_at: DateTime<Utc>,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub is_folder: bool,
    pub size_bytes: Option<u64>,
}

/// Which backend an [`AttachmentStore`] writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Drive,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Drive => "drive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(BackendKind::Local),
            "drive" => Some(BackendKind::Drive),
            _ => None,
        }
    }
}

/// A stored attachment located from its reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub backend: BackendKind,
    pub folder: String,
    pub file_name: String,
}

/// Splits a `local:<folder>/<file>` or `drive:<path>/<folder>/<file>` reference.
///
/// Only the last two path segments matter; the drive root prefix is ignored.
pub fn locate_reference(reference: &str) -> Option<Location> {
    let (scheme, path) = reference.split_once(':')?;
    let backend = BackendKind::parse(scheme)?;
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let file_name = segments.next()?.to_string();
    let folder = segments.next()?.to_string();
    Some(Location {
        backend,
        folder,
        file_name,
    })
}

/// The configured attachment backend.
#[derive(Debug)]
pub enum AttachmentStore {
    Local(LocalStore),
    Drive(DriveClient),
}

impl AttachmentStore {
    pub fn kind(&self) -> BackendKind {
        match self {
            AttachmentStore::Local(_) => BackendKind::Local,
            AttachmentStore::Drive(_) => BackendKind::Drive,
        }
    }

    pub async fn upload(
        &self,
        folder: &str,
        name: &ClientFileName,
        bytes: Vec<u8>,
    ) -> Result<StoredFile, FilesError> {
        match self {
            AttachmentStore::Local(store) => store.upload(folder, name, &bytes),
            AttachmentStore::Drive(client) => client.upload(folder, name, bytes).await,
        }
    }

    /// Deletes one attachment. Returns whether its folder was removed as a result.
    pub async fn delete(&self, folder: &str, file_name: &str) -> Result<bool, FilesError> {
        match self {
            AttachmentStore::Local(store) => store.delete(folder, file_name),
            AttachmentStore::Drive(client) => client.delete(folder, file_name).await,
        }
    }

    pub async fn list(&self, folder: &str) -> Result<Vec<FileEntry>, FilesError> {
        match self {
            AttachmentStore::Local(store) => store.list(folder),
            AttachmentStore::Drive(client) => client.list_folder(folder).await,
        }
    }
}
