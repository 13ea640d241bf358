//! The new requisition wizard, driven over HTTP through persisted drafts.

use super::parse_id;
use crate::error::{ApiError, ApiResult};
use crate::identity::Caller;
use crate::upload::{read_upload, remove_stored};
use crate::AppState;
use api_shared::dto::{DraftRes, ListDraftsRes, RequisitionRes};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use reqtrack_core::{CoreError, Draft, Permission, WizardAction};

/// Turns the errors a rejected action left on the draft into a validation failure.
fn rejected(draft: &Draft) -> Option<ApiError> {
    if draft.state.errors.is_empty() {
        None
    } else {
        Some(CoreError::Validation(draft.state.errors.clone()).into())
    }
}

#[utoipa::path(
    post,
    path = "/drafts",
    responses(
        (status = 201, description = "Empty wizard on the patient step", body = DraftRes),
        (status = 403, description = "Caller cannot create requisitions")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<(StatusCode, Json<DraftRes>)> {
    let draft = state.services.drafts.create(&actor)?;
    Ok((StatusCode::CREATED, Json(DraftRes::from(&draft))))
}

#[utoipa::path(
    get,
    path = "/drafts",
    responses((status = 200, description = "The caller's drafts, most recent first", body = ListDraftsRes))
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_drafts(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<ListDraftsRes>> {
    let drafts = state.services.drafts.list(&actor);
    Ok(Json(ListDraftsRes {
        drafts: drafts.iter().map(DraftRes::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/drafts/{id}",
    responses(
        (status = 200, description = "The draft", body = DraftRes),
        (status = 404, description = "No such draft for this caller")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<DraftRes>> {
    let draft = state.services.drafts.get(&actor, &parse_id(&id)?)?;
    Ok(Json(DraftRes::from(&draft)))
}

#[utoipa::path(
    delete,
    path = "/drafts/{id}",
    responses(
        (status = 204, description = "Draft and its uploaded images discarded"),
        (status = 404, description = "No such draft for this caller")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let draft = state.services.drafts.get(&actor, &id)?;
    state.services.drafts.delete(&actor, &id)?;
    for image in &draft.state.form.images {
        if let Some(reference) = image.reference() {
            remove_stored(&state.attachments, reference).await;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/drafts/{id}/actions",
    responses(
        (status = 200, description = "Action applied, or rejected with field errors on the draft", body = DraftRes),
        (status = 400, description = "Upload progress sent as an action"),
        (status = 404, description = "No such draft for this caller")
    )
)]
/// Apply one wizard action
///
/// The body is a JSON object tagged by `type`, e.g. `{"type": "next"}` or
/// `{"type": "add_procedure", "procedure_id": "..."}`. A rejected action leaves the wizard
/// unchanged and reports its reasons in `errors`. Upload progress (`image_uploading`,
/// `image_uploaded`, `image_failed`) is only recorded by `POST /drafts/{id}/images`.
#[axum::debug_handler(state = AppState)]
pub async fn apply_action(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(action): Json<WizardAction>,
) -> ApiResult<Json<DraftRes>> {
    let id = parse_id(&id)?;
    if action.is_upload_report() {
        return Err(ApiError::bad_request(
            "upload progress is recorded by POST /drafts/{id}/images",
        ));
    }
    let removed_reference = match &action {
        WizardAction::RemoveImage { client_id } => state
            .services
            .drafts
            .get(&actor, &id)?
            .state
            .image(client_id)
            .and_then(|image| image.reference().map(str::to_string)),
        _ => None,
    };

    let draft = state.services.drafts.apply(&actor, &id, action)?;
    if draft.state.errors.is_empty() {
        if let Some(reference) = removed_reference {
            remove_stored(&state.attachments, &reference).await;
        }
    }
    Ok(Json(DraftRes::from(&draft)))
}

#[utoipa::path(
    post,
    path = "/drafts/{id}/images",
    operation_id = "upload_draft_image",
    responses(
        (status = 200, description = "Image uploaded and marked uploaded on the draft", body = DraftRes),
        (status = 400, description = "Malformed file name, or the image is not awaiting upload"),
        (status = 502, description = "Upload failed; the image is marked with the error")
    )
)]
/// Upload one wizard image
///
/// Multipart form with a `file` field named `<client_id>__<original name>`. The image is added
/// to the draft if it is not listed yet, marked uploading, stored, then marked uploaded. A failed
/// upload marks the image `error`; sending it again retries.
#[axum::debug_handler(state = AppState)]
pub async fn upload_image(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<DraftRes>> {
    let id = parse_id(&id)?;
    actor.require(Permission::UploadFiles)?;
    let drafts = &state.services.drafts;
    let draft = drafts.get(&actor, &id)?;

    let upload = read_upload(multipart).await?;
    let client_id = upload.name.client_id().to_string();

    if draft.state.image(&client_id).is_none() {
        let added = drafts.apply(
            &actor,
            &id,
            WizardAction::AddImage {
                client_id: client_id.clone(),
                file_name: upload.name.original().to_string(),
            },
        )?;
        if let Some(e) = rejected(&added) {
            return Err(e);
        }
    }

    let uploading = drafts.apply(
        &actor,
        &id,
        WizardAction::ImageUploading {
            client_id: client_id.clone(),
        },
    )?;
    if let Some(e) = rejected(&uploading) {
        return Err(e);
    }

    match state
        .attachments
        .primary()
        .upload(&id.to_string(), &upload.name, upload.bytes)
        .await
    {
        Ok(stored) => {
            let draft = drafts.apply(
                &actor,
                &id,
                WizardAction::ImageUploaded {
                    client_id,
                    reference: stored.reference,
                },
            )?;
            Ok(Json(DraftRes::from(&draft)))
        }
        Err(e) => {
            tracing::warn!(draft_id = %id, client_id = %client_id, "image upload failed: {}", e);
            drafts.apply(
                &actor,
                &id,
                WizardAction::ImageFailed {
                    client_id,
                    message: e.to_string(),
                },
            )?;
            Err(e.into())
        }
    }
}

#[utoipa::path(
    post,
    path = "/drafts/{id}/submit",
    responses(
        (status = 201, description = "Requisition created; the draft is gone", body = RequisitionRes),
        (status = 400, description = "Wizard incomplete; errors are also saved on the draft")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn submit_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<RequisitionRes>)> {
    let id = parse_id(&id)?;
    let requisition = state.services.drafts.submit(&actor, &id)?;
    tracing::info!(
        draft_id = %id,
        requisition_id = %requisition.id,
        protocol = %requisition.protocol,
        "draft submitted"
    );
    Ok((StatusCode::CREATED, Json(RequisitionRes::from(&requisition))))
}
