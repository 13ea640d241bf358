//! Direct access to the attachment backends.

use crate::error::{ApiError, ApiResult};
use crate::identity::Caller;
use crate::upload::read_upload;
use crate::AppState;
use api_shared::dto::{DeleteFileRes, FileEntryRes, ListFilesRes, StoredFileRes};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use reqtrack_core::Permission;
use reqtrack_files::{AttachmentStore, BackendKind};

fn backend<'a>(state: &'a AppState, name: &str) -> ApiResult<&'a AttachmentStore> {
    let kind = BackendKind::parse(name)
        .ok_or_else(|| ApiError::bad_request(format!("unknown storage backend '{}'", name)))?;
    state.attachments.get(kind).ok_or_else(|| {
        ApiError::Unavailable(format!("storage backend '{}' is not configured", kind.as_str()))
    })
}

#[utoipa::path(
    post,
    path = "/files/{backend}",
    params(("backend" = String, Path, description = "`local` or `drive`")),
    responses(
        (status = 201, description = "File stored", body = StoredFileRes),
        (status = 400, description = "Missing folder or file, or a malformed name"),
        (status = 502, description = "Cloud drive failure"),
        (status = 503, description = "Backend not configured")
    )
)]
/// Store one file
///
/// Multipart form with a `folder` text field and a `file` field whose filename is
/// `<client_id>__<original name>`. Storing the same name again overwrites it.
#[axum::debug_handler(state = AppState)]
pub async fn upload_file(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(backend_name): Path<String>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<StoredFileRes>)> {
    actor.require(Permission::UploadFiles)?;
    let store = backend(&state, &backend_name)?;
    let upload = read_upload(multipart).await?;
    let folder = upload
        .folder
        .ok_or_else(|| ApiError::bad_request("missing folder field"))?;
    let stored = store.upload(&folder, &upload.name, upload.bytes).await?;
    tracing::info!(
        backend = store.kind().as_str(),
        reference = %stored.reference,
        size_bytes = stored.size_bytes,
        "file stored"
    );
    Ok((StatusCode::CREATED, Json(StoredFileRes::from(&stored))))
}

#[utoipa::path(
    get,
    path = "/files/{backend}/{folder}",
    params(
        ("backend" = String, Path, description = "`local` or `drive`"),
        ("folder" = String, Path, description = "Per-request folder")
    ),
    responses(
        (status = 200, description = "Folder contents", body = ListFilesRes),
        (status = 404, description = "No such folder")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_files(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((backend_name, folder)): Path<(String, String)>,
) -> ApiResult<Json<ListFilesRes>> {
    actor.require(Permission::ViewRequisitions)?;
    let store = backend(&state, &backend_name)?;
    let entries = store.list(&folder).await?;
    Ok(Json(ListFilesRes {
        folder,
        files: entries.iter().map(FileEntryRes::from).collect(),
    }))
}

#[utoipa::path(
    delete,
    path = "/files/{backend}/{folder}/{name}",
    params(
        ("backend" = String, Path, description = "`local` or `drive`"),
        ("folder" = String, Path, description = "Per-request folder"),
        ("name" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteFileRes),
        (status = 404, description = "No such file")
    )
)]
/// Delete one file
///
/// The folder is removed as well once it is empty; `folder_removed` reports whether that
/// happened.
#[axum::debug_handler(state = AppState)]
pub async fn delete_file(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((backend_name, folder, name)): Path<(String, String, String)>,
) -> ApiResult<Json<DeleteFileRes>> {
    actor.require(Permission::UploadFiles)?;
    let store = backend(&state, &backend_name)?;
    let folder_removed = store.delete(&folder, &name).await?;
    tracing::info!(
        backend = store.kind().as_str(),
        folder = %folder,
        file_name = %name,
        folder_removed,
        "file deleted"
    );
    Ok(Json(DeleteFileRes {
        deleted: true,
        folder_removed,
    }))
}
