use super::parse_id;
use crate::error::ApiResult;
use crate::identity::{ApiKey, Caller};
use crate::AppState;
use api_shared::dto::{
    parse_optional_id, AssignUnitReq, ListUsersRes, RegisterUserReq, SetRoleReq, UserRes,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use reqtrack_core::Role;

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "The caller's profile", body = UserRes),
        (status = 401, description = "Missing or unknown credentials")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn me(State(state): State<AppState>, Caller(actor): Caller) -> ApiResult<Json<UserRes>> {
    let profile = state.services.users.get(&actor.user_id)?;
    Ok(Json(UserRes::from(&profile)))
}

#[utoipa::path(
    post,
    path = "/users/register",
    request_body = RegisterUserReq,
    responses(
        (status = 201, description = "Profile created with the pending role", body = UserRes),
        (status = 400, description = "Invalid name or email"),
        (status = 409, description = "Email already registered")
    )
)]
/// Self-registration. Needs only the API key; the new profile has no permissions until an
/// administrator assigns a role.
#[axum::debug_handler(state = AppState)]
pub async fn register(
    State(state): State<AppState>,
    _key: ApiKey,
    Json(req): Json<RegisterUserReq>,
) -> ApiResult<(StatusCode, Json<UserRes>)> {
    let profile = state.services.users.register(&req.name, &req.email)?;
    tracing::info!(user_id = %profile.id, "user registered");
    Ok((StatusCode::CREATED, Json(UserRes::from(&profile))))
}

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All profiles", body = ListUsersRes),
        (status = 403, description = "Caller cannot manage users")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_users(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<ListUsersRes>> {
    let users = state.services.users.list(&actor)?;
    Ok(Json(ListUsersRes {
        users: users.iter().map(UserRes::from).collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/users/{id}/role",
    request_body = SetRoleReq,
    responses(
        (status = 200, description = "Role changed", body = UserRes),
        (status = 403, description = "Caller cannot manage users"),
        (status = 409, description = "Would remove the last administrator")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn set_role(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<SetRoleReq>,
) -> ApiResult<Json<UserRes>> {
    let id = parse_id(&id)?;
    let role: Role = req.role.parse()?;
    let profile = state.services.users.set_role(&actor, &id, role)?;
    tracing::info!(user_id = %id, role = %role, "role changed");
    Ok(Json(UserRes::from(&profile)))
}

#[utoipa::path(
    put,
    path = "/users/{id}/unit",
    request_body = AssignUnitReq,
    responses(
        (status = 200, description = "Unit binding changed", body = UserRes),
        (status = 400, description = "Unknown health unit")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn assign_unit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<AssignUnitReq>,
) -> ApiResult<Json<UserRes>> {
    let id = parse_id(&id)?;
    let unit_id = parse_optional_id("unit_id", req.unit_id.as_deref())?;
    let profile = state.services.users.assign_unit(&actor, &id, unit_id)?;
    Ok(Json(UserRes::from(&profile)))
}
