//! Requisition listing, creation, workflow and attachments.

use super::parse_id;
use crate::error::ApiResult;
use crate::identity::Caller;
use crate::upload::{read_upload, remove_stored, verify_attachments};
use crate::AppState;
use api_shared::dto::{
    CreateRequisitionReq, ListRequisitionsRes, NotesReq, RequisitionQuery, RequisitionRes,
    SummaryRes, TransitionReq,
};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use reqtrack_core::{CoreError, ImageRef, Permission, Transition};

#[utoipa::path(
    get,
    path = "/requisitions",
    params(RequisitionQuery),
    responses(
        (status = 200, description = "Matching requisitions, newest first", body = ListRequisitionsRes),
        (status = 400, description = "Unknown status or priority filter")
    )
)]
/// List requisitions visible to the caller
///
/// Unit-bound viewers and registrars only ever see their own unit's requisitions, whatever
/// `unit_id` filter they send.
#[axum::debug_handler(state = AppState)]
pub async fn list_requisitions(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(query): Query<RequisitionQuery>,
) -> ApiResult<Json<ListRequisitionsRes>> {
    let filter = query.into_filter()?;
    let requisitions = state.services.requisitions.list(&actor, &filter)?;
    Ok(Json(ListRequisitionsRes {
        requisitions: requisitions.iter().map(RequisitionRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/requisitions",
    request_body = CreateRequisitionReq,
    responses(
        (status = 201, description = "Requisition created as pending", body = RequisitionRes),
        (status = 400, description = "Field errors"),
        (status = 403, description = "Caller cannot create requisitions for this unit")
    )
)]
/// Create a requisition in one request
///
/// Runs the same validation as the wizard's review step. Images must already be uploaded
/// through the file endpoints; each reference must point at an existing file named after its
/// client id that no other requisition or draft owns.
#[axum::debug_handler(state = AppState)]
pub async fn create_requisition(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<CreateRequisitionReq>,
) -> ApiResult<(StatusCode, Json<RequisitionRes>)> {
    let form = req.into_form()?;
    verify_attachments(&state, &actor, &form.images).await?;
    let requisition = state.services.requisitions.create(&actor, &form)?;
    tracing::info!(
        requisition_id = %requisition.id,
        protocol = %requisition.protocol,
        "requisition created"
    );
    Ok((StatusCode::CREATED, Json(RequisitionRes::from(&requisition))))
}

#[utoipa::path(
    get,
    path = "/requisitions/summary",
    responses((status = 200, description = "Visible requisitions counted per status", body = SummaryRes))
)]
#[axum::debug_handler(state = AppState)]
pub async fn summary(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<SummaryRes>> {
    let summary = state.services.requisitions.summary(&actor)?;
    Ok(Json(SummaryRes::from(&summary)))
}

#[utoipa::path(
    get,
    path = "/requisitions/{id}",
    responses(
        (status = 200, description = "The requisition", body = RequisitionRes),
        (status = 404, description = "No such requisition, or not visible to the caller")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_requisition(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<RequisitionRes>> {
    let requisition = state.services.requisitions.get(&actor, &parse_id(&id)?)?;
    Ok(Json(RequisitionRes::from(&requisition)))
}

#[utoipa::path(
    post,
    path = "/requisitions/{id}/transitions",
    request_body = TransitionReq,
    responses(
        (status = 200, description = "Status changed", body = RequisitionRes),
        (status = 400, description = "Missing reason or schedule before creation"),
        (status = 409, description = "Transition not allowed from the current status")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn transition(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<TransitionReq>,
) -> ApiResult<Json<RequisitionRes>> {
    let id = parse_id(&id)?;
    let transition = Transition::from(req);
    let target = transition.target();
    let requisition = state
        .services
        .requisitions
        .transition(&actor, &id, transition)?;
    tracing::info!(requisition_id = %id, status = %target, "requisition status changed");
    Ok(Json(RequisitionRes::from(&requisition)))
}

#[utoipa::path(
    put,
    path = "/requisitions/{id}/notes",
    request_body = NotesReq,
    responses(
        (status = 200, description = "Notes replaced", body = RequisitionRes),
        (status = 404, description = "No such requisition")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_notes(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<NotesReq>,
) -> ApiResult<Json<RequisitionRes>> {
    let requisition = state.services.requisitions.update_notes(
        &actor,
        &parse_id(&id)?,
        req.notes.as_deref(),
    )?;
    Ok(Json(RequisitionRes::from(&requisition)))
}

#[utoipa::path(
    post,
    path = "/requisitions/{id}/images",
    operation_id = "upload_requisition_image",
    responses(
        (status = 201, description = "Attachment stored and recorded", body = RequisitionRes),
        (status = 400, description = "Missing file or malformed file name"),
        (status = 409, description = "Requisition is completed or canceled"),
        (status = 502, description = "Attachment storage unavailable")
    )
)]
/// Attach a supporting image to an existing requisition
///
/// Multipart form with a `file` field named `<client_id>__<original name>`. Uploading the same
/// client id again replaces the earlier attachment.
#[axum::debug_handler(state = AppState)]
pub async fn upload_image(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<RequisitionRes>)> {
    let id = parse_id(&id)?;
    actor.require(Permission::UploadFiles)?;
    let requisition = state.services.requisitions.get(&actor, &id)?;
    if requisition.status.is_terminal() {
        return Err(CoreError::Conflict(format!(
            "requisition {} is {}",
            requisition.protocol, requisition.status
        ))
        .into());
    }

    let upload = read_upload(multipart).await?;
    let stored = state
        .attachments
        .primary()
        .upload(&requisition.id.to_string(), &upload.name, upload.bytes)
        .await?;
    let image = ImageRef {
        client_id: stored.client_id.clone(),
        file_name: stored.original_name.clone(),
        reference: stored.reference.clone(),
    };

    match state.services.requisitions.attach_image(&actor, &id, image) {
        Ok(requisition) => {
            tracing::info!(
                requisition_id = %id,
                reference = %stored.reference,
                "attachment stored"
            );
            Ok((StatusCode::CREATED, Json(RequisitionRes::from(&requisition))))
        }
        Err(e) => {
            remove_stored(&state.attachments, &stored.reference).await;
            Err(e.into())
        }
    }
}

#[utoipa::path(
    delete,
    path = "/requisitions/{id}/images/{client_id}",
    responses(
        (status = 200, description = "Attachment removed", body = RequisitionRes),
        (status = 404, description = "No such requisition or attachment")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_image(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((id, client_id)): Path<(String, String)>,
) -> ApiResult<Json<RequisitionRes>> {
    let id = parse_id(&id)?;
    let removed = state
        .services
        .requisitions
        .detach_image(&actor, &id, &client_id)?;
    remove_stored(&state.attachments, &removed.reference).await;
    let requisition = state.services.requisitions.get(&actor, &id)?;
    Ok(Json(RequisitionRes::from(&requisition)))
}
