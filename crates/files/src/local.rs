//! Local filesystem attachment backend.
//!
//! Attachments are grouped in one folder per requisition under a single root:
//!
//! ```text
//! <root>/
//! └── <folder>/                 # usually the requisition protocol or draft id
//!     ├── <client_id>__scan.jpg
//!     └── <client_id>__report.pdf
//! ```
//!
//! Every path is derived from validated single segments and checked to stay under the
//! canonicalised root, so neither the folder nor the file name can escape it.

use crate::naming::{validate_folder, ClientFileName};
use crate::{FileEntry, FilesError, StoredFile};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Attachment storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Opens (creating if needed) a local store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidRootDirectory`] if the root exists but is not a directory or
    /// cannot be created or canonicalised.
    pub fn new(root: &Path) -> Result<Self, FilesError> {
        if root.exists() && !root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        fs::create_dir_all(root).map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot create directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let root = root.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` as `<folder>/<name>`, replacing an earlier upload with the same name.
    ///
    /// Replacing is what makes a manual retry of a failed upload idempotent.
    pub fn upload(
        &self,
        folder: &str,
        name: &ClientFileName,
        bytes: &[u8],
    ) -> Result<StoredFile, FilesError> {
        let folder_path = self.folder_path(folder)?;
        fs::create_dir_all(&folder_path)?;

        let file_name = name.file_name();
        let target = folder_path.join(&file_name);
        let staging = folder_path.join(format!(".{}.partial", file_name));

        fs::write(&staging, bytes).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write file to {}: {}", staging.display(), e),
            ))
        })?;
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }

        tracing::debug!(folder, file = %file_name, size = bytes.len(), "stored local attachment");

        Ok(StoredFile {
            folder: folder.to_string(),
            file_name,
            client_id: name.client_id().to_string(),
            original_name: name.original().to_string(),
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
            media_type: infer::get(bytes).map(|kind| kind.mime_type().to_string()),
            reference: format!("local:{}/{}", folder, name.file_name()),
            stored_at: Utc::now(),
        })
    }

    /// Reads a stored attachment back.
    pub fn read(&self, folder: &str, file_name: &str) -> Result<Vec<u8>, FilesError> {
        let path = self.file_path(folder, file_name)?;
        if !path.is_file() {
            return Err(FilesError::NotFound(format!("{}/{}", folder, file_name)));
        }
        Ok(fs::read(&path)?)
    }

    /// Deletes `<folder>/<file_name>`, then removes the folder if nothing is left in it.
    ///
    /// Returns whether the folder was removed. A failure to remove the folder is logged and
    /// otherwise ignored.
    pub fn delete(&self, folder: &str, file_name: &str) -> Result<bool, FilesError> {
        let path = self.file_path(folder, file_name)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FilesError::NotFound(format!("{}/{}", folder, file_name)));
            }
            Err(e) => return Err(e.into()),
        }

        let folder_path = self.folder_path(folder)?;
        let is_empty = fs::read_dir(&folder_path)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if !is_empty {
            return Ok(false);
        }

        match fs::remove_dir(&folder_path) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(
                    "failed to remove empty folder {}: {}",
                    folder_path.display(),
                    e
                );
                Ok(false)
            }
        }
    }

    /// Lists the attachments in `folder`, sorted by name. A missing folder lists as empty.
    pub fn list(&self, folder: &str) -> Result<Vec<FileEntry>, FilesError> {
        let folder_path = self.folder_path(folder)?;
        let iter = match fs::read_dir(&folder_path) {
            Ok(it) => it,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for entry in iter {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata()?;
            entries.push(FileEntry {
                name,
                is_folder: metadata.is_dir(),
                size_bytes: metadata.is_file().then(|| metadata.len()),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn folder_path(&self, folder: &str) -> Result<PathBuf, FilesError> {
        validate_folder(folder)?;
        let path = self.root.join(folder);
        self.ensure_within_root(&path)?;
        Ok(path)
    }

    fn file_path(&self, folder: &str, file_name: &str) -> Result<PathBuf, FilesError> {
        let name = ClientFileName::parse(file_name)?;
        if name.file_name() != file_name {
            return Err(FilesError::InvalidName(format!(
                "'{}' is not a stored file name",
                file_name
            )));
        }
        Ok(self.folder_path(folder)?.join(file_name))
    }

    fn ensure_within_root(&self, path: &Path) -> Result<(), FilesError> {
        // Segments are validated, but a pre-existing symlink could still point elsewhere.
        if let Ok(resolved) = path.canonicalize() {
            if !resolved.starts_with(&self.root) {
                return Err(FilesError::InvalidPath(format!(
                    "{} resolves outside the storage root",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
