//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into services. Nothing in
//! this crate reads environment variables; the binaries collect the raw values and hand them to
//! the `*_from_env_value` helpers below.

use crate::constants::{DEFAULT_MAX_UPLOAD_BYTES, UPLOADS_DIR_NAME};
use crate::error::{CoreError, CoreResult};
use crate::store::DocumentStore;
use reqtrack_files::{AttachmentStore, BackendKind, DriveClient, DriveConfig, LocalStore};
use reqtrack_types::{EmailAddress, NonEmptyText};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    bootstrap_admin: Option<EmailAddress>,
    max_upload_bytes: usize,
}

impl CoreConfig {
    pub fn new(
        data_dir: PathBuf,
        bootstrap_admin: Option<EmailAddress>,
        max_upload_bytes: usize,
    ) -> CoreResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(CoreError::InvalidInput("data_dir cannot be empty".into()));
        }
        if max_upload_bytes == 0 {
            return Err(CoreError::InvalidInput(
                "max_upload_bytes must be greater than zero".into(),
            ));
        }
        Ok(Self {
            data_dir,
            bootstrap_admin,
            max_upload_bytes,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Default root of the local attachment backend.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join(UPLOADS_DIR_NAME)
    }

    pub fn bootstrap_admin(&self) -> Option<&EmailAddress> {
        self.bootstrap_admin.as_ref()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Opens the document store under the data dir.
    pub fn open_store(&self) -> CoreResult<Arc<DocumentStore>> {
        DocumentStore::open(&self.data_dir).map(Arc::new)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses an optional bootstrap administrator email.
pub fn bootstrap_admin_from_env_value(value: Option<String>) -> CoreResult<Option<EmailAddress>> {
    non_blank(value)
        .map(|v| EmailAddress::parse(v).map_err(CoreError::from))
        .transpose()
}

/// Parses the multipart body limit in bytes; unset means 10 MiB.
pub fn max_upload_bytes_from_env_value(value: Option<String>) -> CoreResult<usize> {
    match non_blank(value) {
        None => Ok(DEFAULT_MAX_UPLOAD_BYTES),
        Some(v) => v.parse::<usize>().map_err(|_| {
            CoreError::InvalidInput(format!("MAX_UPLOAD_BYTES must be a byte count, got '{}'", v))
        }),
    }
}

/// Parses the attachment backend selector; unset means local.
pub fn storage_backend_from_env_value(value: Option<String>) -> CoreResult<BackendKind> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("local") => Ok(BackendKind::Local),
        Some("drive") => Ok(BackendKind::Drive),
        Some(other) => Err(CoreError::InvalidInput(format!(
            "STORAGE_BACKEND must be 'local' or 'drive', got '{}'",
            other
        ))),
    }
}

/// Raw drive settings as read from the environment.
#[derive(Clone, Debug, Default)]
pub struct DriveEnv {
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub root_folder: Option<String>,
    pub api_url: Option<String>,
    pub content_url: Option<String>,
    pub auth_url: Option<String>,
}

impl DriveEnv {
    /// `None` when no credential is set at all; an error when only some are.
    pub fn into_config(self) -> CoreResult<Option<DriveConfig>> {
        let key = non_blank(self.app_key);
        let secret = non_blank(self.app_secret);
        let token = non_blank(self.refresh_token);
        if key.is_none() && secret.is_none() && token.is_none() {
            return Ok(None);
        }

        let required = |name: &str, value: Option<String>| {
            value
                .and_then(|v| NonEmptyText::new(v).ok())
                .ok_or_else(|| CoreError::InvalidInput(format!("{} is required for the drive backend", name)))
        };
        let mut config = DriveConfig::new(
            required("DRIVE_APP_KEY", key)?,
            required("DRIVE_APP_SECRET", secret)?,
            required("DRIVE_REFRESH_TOKEN", token)?,
        );
        if let Some(root) = non_blank(self.root_folder) {
            config = config.with_root_folder(&root);
        }
        if let Some(url) = non_blank(self.api_url) {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = non_blank(self.content_url) {
            config.content_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = non_blank(self.auth_url) {
            config.auth_url = url.trim_end_matches('/').to_string();
        }
        Ok(Some(config))
    }
}

/// Attachment storage configuration.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    primary: BackendKind,
    local_root: PathBuf,
    drive: Option<DriveConfig>,
}

impl StorageConfig {
    /// # Errors
    ///
    /// [`CoreError::InvalidInput`] if `primary` is the drive but no drive config is given.
    pub fn new(
        primary: BackendKind,
        local_root: PathBuf,
        drive: Option<DriveConfig>,
    ) -> CoreResult<Self> {
        if primary == BackendKind::Drive && drive.is_none() {
            return Err(CoreError::InvalidInput(
                "STORAGE_BACKEND=drive needs DRIVE_APP_KEY, DRIVE_APP_SECRET and DRIVE_REFRESH_TOKEN"
                    .into(),
            ));
        }
        Ok(Self {
            primary,
            local_root,
            drive,
        })
    }

    pub fn primary(&self) -> BackendKind {
        self.primary
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Opens every configured backend.
    pub fn open(&self) -> CoreResult<AttachmentBackends> {
        let local = AttachmentStore::Local(LocalStore::new(&self.local_root)?);
        let drive = match &self.drive {
            Some(config) => Some(AttachmentStore::Drive(DriveClient::new(config.clone())?)),
            None => None,
        };
        tracing::info!(
            primary = self.primary.as_str(),
            drive = drive.is_some(),
            "attachment storage ready"
        );
        Ok(AttachmentBackends {
            primary: self.primary,
            local,
            drive,
        })
    }
}

/// The opened attachment backends. Local storage is always available; the drive only when
/// configured. Wizard and requisition uploads go to the primary backend.
#[derive(Debug)]
pub struct AttachmentBackends {
    primary: BackendKind,
    local: AttachmentStore,
    drive: Option<AttachmentStore>,
}

impl AttachmentBackends {
    pub fn get(&self, kind: BackendKind) -> Option<&AttachmentStore> {
        match kind {
            BackendKind::Local => Some(&self.local),
            BackendKind::Drive => self.drive.as_ref(),
        }
    }

    pub fn primary(&self) -> &AttachmentStore {
        self.get(self.primary).unwrap_or(&self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backend_selector_defaults_to_local() {
        assert_eq!(storage_backend_from_env_value(None).unwrap(), BackendKind::Local);
        assert_eq!(
            storage_backend_from_env_value(Some(" Drive ".into())).unwrap(),
            BackendKind::Drive
        );
        assert!(storage_backend_from_env_value(Some("s3".into())).is_err());
    }

    #[test]
    fn upload_limit_parsing() {
        assert_eq!(max_upload_bytes_from_env_value(None).unwrap(), DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(
            max_upload_bytes_from_env_value(Some("2048".into())).unwrap(),
            2048
        );
        assert!(max_upload_bytes_from_env_value(Some("lots".into())).is_err());
    }

    #[test]
    fn bootstrap_admin_parsing() {
        assert!(bootstrap_admin_from_env_value(Some("  ".into()))
            .unwrap()
            .is_none());
        assert!(bootstrap_admin_from_env_value(Some("nope".into())).is_err());
    }

    #[test]
    fn drive_env_needs_all_credentials() {
        assert!(DriveEnv::default().into_config().unwrap().is_none());

        let partial = DriveEnv {
            app_key: Some("key".into()),
            ..Default::default()
        };
        assert!(partial.into_config().is_err());

        let full = DriveEnv {
            app_key: Some("key".into()),
            app_secret: Some("secret".into()),
            refresh_token: Some("refresh".into()),
            root_folder: Some("pedidos/".into()),
            auth_url: Some("http://127.0.0.1:9999/".into()),
            ..Default::default()
        };
        let config = full.into_config().unwrap().unwrap();
        assert_eq!(config.root_folder, "/pedidos");
        assert_eq!(config.auth_url, "http://127.0.0.1:9999");
    }

    #[test]
    fn drive_primary_requires_drive_config() {
        let temp = TempDir::new().unwrap();
        assert!(StorageConfig::new(BackendKind::Drive, temp.path().to_path_buf(), None).is_err());
    }

    #[test]
    fn open_local_only() {
        let temp = TempDir::new().unwrap();
        let storage =
            StorageConfig::new(BackendKind::Local, temp.path().join("uploads"), None).unwrap();
        let backends = storage.open().unwrap();
        assert_eq!(backends.primary().kind(), BackendKind::Local);
        assert!(backends.get(BackendKind::Drive).is_none());
        assert!(temp.path().join("uploads").is_dir());
    }

    #[test]
    fn core_config_rejects_zero_limit() {
        assert!(CoreConfig::new(PathBuf::from("data"), None, 0).is_err());
    }
}
