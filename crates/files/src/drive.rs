//! Cloud-drive attachment backend.
//!
//! Talks to a Dropbox-style v2 HTTP API:
//!
//! - `POST {auth_url}/oauth2/token` exchanges the long-lived refresh token for a short-lived
//!   access token,
//! - `POST {api_url}/2/files/<rpc>` carries JSON arguments and results,
//! - `POST {content_url}/2/files/upload` carries the file bytes, with the JSON argument in the
//!   `Dropbox-API-Arg` header.
//!
//! One folder is created per requisition under the configured root folder. All calls are
//! sequential; nothing here retries on its own.

use crate::constants::{
    DEFAULT_DRIVE_API_URL, DEFAULT_DRIVE_AUTH_URL,
    DEFAULT_DRIVE_CONTENT_URL, DEFAULT_DRIVE_ROOT_FOLDER, TOKEN_REFRESH_MARGIN_SECS,
};
use crate::naming::{validate_folder, ClientFileName};
use crate::{FileEntry, FilesError, StoredFile};
use chrono::{DateTime, Duration, Utc};
use reqtrack_types::NonEmptyText;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// Credentials and endpoints for the drive backend.
#[derive(Clone, Debug)]
pub struct DriveConfig {
    pub app_key: NonEmptyText,
    pub app_secret: NonEmptyText,
    pub refresh_token: NonEmptyText,
    /// Absolute drive path that holds the per-requisition folders, e.g. `/requisitions`.
    pub root_folder: String,
    pub api_url: String,
    pub content_url: String,
    pub auth_url: String,
}

impl DriveConfig {
    /// Config pointing at the public endpoints with the default root folder.
    pub fn new(app_key: NonEmptyText, app_secret: NonEmptyText, refresh_token: NonEmptyText) -> Self {
        Self {
            app_key,
            app_secret,
            refresh_token,
            root_folder: DEFAULT_DRIVE_ROOT_FOLDER.to_string(),
            api_url: DEFAULT_DRIVE_API_URL.to_string(),
            content_url: DEFAULT_DRIVE_CONTENT_URL.to_string(),
            auth_url: DEFAULT_DRIVE_AUTH_URL.to_string(),
        }
    }

    /// Points all three endpoints at the same base URL (used against a local stand-in).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        self.api_url = base.clone();
        self.content_url = base.clone();
        self.auth_url = base;
        self
    }

    pub fn with_root_folder(mut self, root_folder: &str) -> Self {
        self.root_folder = normalise_root(root_folder);
        self
    }
}

fn normalise_root(root: &str) -> String {
    let trimmed = root.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ListFolderResponse {
    entries: Vec<ListEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Deserialize)]
struct ListEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    #[serde(default)]
    size: Option<u64>,
}

/// HTTP client for the cloud drive.
///
/// Cheap to share behind an `Arc`; the cached access token is guarded by an async mutex so
/// concurrent requests refresh it at most once.
#[derive(Debug)]
pub struct DriveClient {
    http: reqwest::Client,
    config: DriveConfig,
    token: Mutex<Option<AccessToken>>,
}

impl DriveClient {
    pub fn new(config: DriveConfig) -> Result<Self, FilesError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            config: DriveConfig {
                root_folder: normalise_root(&config.root_folder),
                ..config
            },
            token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Absolute drive path of a requisition folder.
    pub fn folder_path(&self, folder: &str) -> Result<String, FilesError> {
        validate_folder(folder)?;
        Ok(format!("{}/{}", self.config.root_folder, folder))
    }

    /// Returns a valid access token, exchanging the refresh token when the cached one is stale.
    async fn access_token(&self) -> Result<String, FilesError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("refreshing drive access token");
        let response = self
            .http
            .post(format!("{}/oauth2/token", self.config.auth_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("client_id", self.config.app_key.as_str()),
                ("client_secret", self.config.app_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FilesError::Auth(format!(
                "token exchange failed with status {}: {}",
                status, body
            )));
        }

        let parsed: TokenResponse = response.json().await?;
        let token = AccessToken {
            value: parsed.access_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
        };
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn rpc(&self, endpoint: &str, body: Value) -> Result<reqwest::Response, FilesError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/2/files/{}", self.config.api_url, endpoint))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        Ok(response)
    }

    /// Creates a folder. Returns `false` if it already existed.
    pub async fn create_folder(&self, folder: &str) -> Result<bool, FilesError> {
        let path = self.folder_path(folder)?;
        let response = self
            .rpc(
                "create_folder_v2",
                json!({ "path": path, "autorename": false }),
            )
            .await?;

        if response.status().is_success() {
            tracing::info!("created drive folder {}", path);
            return Ok(true);
        }

        let (status, body) = read_failure(response).await;
        if status == 409 && body.contains("path/conflict") {
            return Ok(false);
        }
        Err(FilesError::Remote { status, body })
    }

    /// Uploads `bytes` into `folder`, creating the folder first when needed.
    ///
    /// Upload mode is `overwrite`, so re-sending the same client file name after a failure
    /// replaces whatever partial state the drive kept.
    pub async fn upload(
        &self,
        folder: &str,
        name: &ClientFileName,
        bytes: Vec<u8>,
    ) -> Result<StoredFile, FilesError> {
        self.create_folder(folder).await?;

        let path = format!("{}/{}", self.folder_path(folder)?, name.file_name());
        let arg = json!({
            "path": path,
            "mode": "overwrite",
            "autorename": false,
            "mute": true,
        });

        let sha256 = hex::encode(Sha256::digest(&bytes));
        let media_type = infer::get(&bytes).map(|kind| kind.mime_type().to_string());
        let size_bytes = bytes.len() as u64;

        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/2/files/upload", self.config.content_url))
            .bearer_auth(token)
            .header(API_ARG_HEADER, arg.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = read_failure(response).await;
            return Err(FilesError::Remote { status, body });
        }

        let uploaded: UploadResponse = response.json().await?;
        tracing::info!("uploaded {} to drive", path);

        Ok(StoredFile {
            folder: folder.to_string(),
            file_name: name.file_name(),
            client_id: name.client_id().to_string(),
            original_name: name.original().to_string(),
            size_bytes: uploaded.size.unwrap_or(size_bytes),
            sha256,
            media_type,
            reference: format!("drive:{}", uploaded.path_display.unwrap_or(path)),
            stored_at: Utc::now(),
        })
    }

    /// Deletes `<folder>/<file_name>`, then removes the folder if it became empty.
    ///
    /// Returns whether the folder was removed. Folder cleanup is best effort: its failures are
    /// logged and do not fail the delete.
    pub async fn delete(&self, folder: &str, file_name: &str) -> Result<bool, FilesError> {
        let name = ClientFileName::parse(file_name)?;
        let path = format!("{}/{}", self.folder_path(folder)?, name.file_name());

        let response = self.rpc("delete_v2", json!({ "path": path })).await?;
        if !response.status().is_success() {
            let (status, body) = read_failure(response).await;
            if status == 409 && body.contains("not_found") {
                return Err(FilesError::NotFound(path));
            }
            return Err(FilesError::Remote { status, body });
        }
        tracing::info!("deleted {} from drive", path);

        match self.delete_folder_if_empty(folder).await {
            Ok(removed) => Ok(removed),
            Err(e) => {
                tracing::warn!("failed to clean up drive folder {}: {}", folder, e);
                Ok(false)
            }
        }
    }

    /// Removes `folder` if it has no entries. Returns whether it was removed.
    pub async fn delete_folder_if_empty(&self, folder: &str) -> Result<bool, FilesError> {
        if !self.list_folder(folder).await?.is_empty() {
            return Ok(false);
        }

        let path = self.folder_path(folder)?;
        let response = self.rpc("delete_v2", json!({ "path": path })).await?;
        if response.status().is_success() {
            tracing::info!("removed empty drive folder {}", path);
            return Ok(true);
        }
        let (status, body) = read_failure(response).await;
        Err(FilesError::Remote { status, body })
    }

    /// Lists a folder's entries, following pagination cursors. A missing folder lists as empty.
    pub async fn list_folder(&self, folder: &str) -> Result<Vec<FileEntry>, FilesError> {
        let path = self.folder_path(folder)?;
        let mut response = self.rpc("list_folder", json!({ "path": path })).await?;
        let mut entries = Vec::new();

        loop {
            if !response.status().is_success() {
                let (status, body) = read_failure(response).await;
                if status == 409 && body.contains("not_found") {
                    return Ok(Vec::new());
                }
                return Err(FilesError::Remote { status, body });
            }

            let page: ListFolderResponse = response.json().await?;
            entries.extend(page.entries.into_iter().map(|entry| FileEntry {
                is_folder: entry.tag == "folder",
                name: entry.name,
                size_bytes: entry.size,
            }));

            if !page.has_more {
                break;
            }
            response = self
                .rpc("list_folder/continue", json!({ "cursor": page.cursor }))
                .await?;
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

async fn read_failure(response: reqwest::Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    (status, body)
}
