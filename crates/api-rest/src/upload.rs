//! Multipart upload parsing shared by the draft, requisition and file endpoints, plus the
//! checks on attachment references that clients send back.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::Multipart;
use reqtrack_core::wizard::images::ImageItem;
use reqtrack_core::{Actor, AttachmentBackends, CoreError, FieldError};
use reqtrack_files::{locate_reference, ClientFileName};

/// One uploaded file, plus the optional `folder` text field.
pub struct Upload {
    pub folder: Option<String>,
    pub name: ClientFileName,
    pub bytes: Vec<u8>,
}

/// Reads the `folder` and `file` fields. Unknown fields are ignored.
///
/// The `file` field's filename must be `<client_id>__<original name>`.
pub async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    let mut folder = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "folder" => {
                let value = field.text().await?;
                let value = value.trim();
                if !value.is_empty() {
                    folder = Some(value.to_string());
                }
            }
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("the file field needs a filename"))?;
                let name = ClientFileName::parse(&file_name)?;
                let bytes = field.bytes().await?.to_vec();
                file = Some((name, bytes));
            }
            other => tracing::debug!(field = other, "ignoring multipart field"),
        }
    }

    let (name, bytes) = file.ok_or_else(|| ApiError::bad_request("missing file field"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("uploaded file is empty"));
    }
    Ok(Upload {
        folder,
        name,
        bytes,
    })
}

/// Deletes a stored attachment by its reference. Failures are logged, never returned.
pub async fn remove_stored(backends: &AttachmentBackends, reference: &str) {
    let Some(location) = locate_reference(reference) else {
        tracing::warn!(reference, "cannot locate stored attachment");
        return;
    };
    let Some(store) = backends.get(location.backend) else {
        tracing::warn!(
            reference,
            backend = location.backend.as_str(),
            "attachment backend not configured"
        );
        return;
    };
    match store.delete(&location.folder, &location.file_name).await {
        Ok(folder_removed) => {
            tracing::debug!(reference, folder_removed, "stored attachment removed")
        }
        Err(e) => tracing::warn!(reference, "failed to remove stored attachment: {}", e),
    }
}

/// Checks every uploaded image a client lists against the attachment backends.
///
/// A reference must name a configured backend, embed the image's client id in its file name,
/// point at a file that exists, and not belong to another record. Images that have not finished
/// uploading are left to the form validation.
pub async fn verify_attachments(
    state: &AppState,
    actor: &Actor,
    images: &[ImageItem],
) -> ApiResult<()> {
    let mut errors = Vec::new();
    for (i, image) in images.iter().enumerate() {
        let Some(reference) = image.reference() else {
            continue;
        };
        if let Err(message) = check_attachment(state, actor, &image.client_id, reference).await {
            errors.push(FieldError::new(format!("images[{}].reference", i), message));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(errors).into())
    }
}

async fn check_attachment(
    state: &AppState,
    actor: &Actor,
    client_id: &str,
    reference: &str,
) -> Result<(), String> {
    let location =
        locate_reference(reference).ok_or_else(|| "not a stored attachment reference".to_string())?;
    let name = ClientFileName::parse(&location.file_name).map_err(|e| e.to_string())?;
    if name.client_id() != client_id {
        return Err(format!("file {} is not image {}", location.file_name, client_id));
    }

    let store = state
        .attachments
        .get(location.backend)
        .ok_or_else(|| format!("{} storage is not configured", location.backend.as_str()))?;
    let files = store.list(&location.folder).await.map_err(|e| {
        tracing::warn!(reference, "cannot list attachment folder: {}", e);
        "attachment could not be checked".to_string()
    })?;
    if !files
        .iter()
        .any(|f| !f.is_folder && f.name == location.file_name)
    {
        return Err("attachment not found".to_string());
    }

    if state
        .services
        .requisitions
        .attachment_claimed(actor, &location.folder, reference)
    {
        return Err("attachment belongs to another record".to_string());
    }
    Ok(())
}
