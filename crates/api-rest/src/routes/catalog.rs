//! Health units, health agents and the procedure catalog.

use super::parse_id;
use crate::error::ApiResult;
use crate::identity::Caller;
use crate::AppState;
use api_shared::dto::{
    parse_optional_id, AgentReq, AgentRes, CatalogQuery, GroupReq, GroupRes, ListAgentsRes,
    ListGroupsRes, ListProceduresRes, ListUnitsRes, ProcedureReq, ProcedureRes, UnitReq, UnitRes,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use reqtrack_core::{AgentInput, GroupInput, ProcedureInput, UnitInput};

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/units",
    params(CatalogQuery),
    responses((status = 200, description = "Health units sorted by name", body = ListUnitsRes))
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_units(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<ListUnitsRes>> {
    let units = state.services.units.list(&actor, query.include_inactive)?;
    Ok(Json(ListUnitsRes {
        units: units.iter().map(UnitRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/units",
    request_body = UnitReq,
    responses(
        (status = 201, description = "Unit created", body = UnitRes),
        (status = 400, description = "Invalid fields"),
        (status = 409, description = "Name or CNES already used")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_unit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<UnitReq>,
) -> ApiResult<(StatusCode, Json<UnitRes>)> {
    let unit = state.services.units.create(&actor, &UnitInput::from(req))?;
    tracing::info!(unit_id = %unit.id, "health unit created");
    Ok((StatusCode::CREATED, Json(UnitRes::from(&unit))))
}

#[utoipa::path(
    get,
    path = "/units/{id}",
    responses(
        (status = 200, description = "The unit", body = UnitRes),
        (status = 404, description = "No such unit")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_unit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<UnitRes>> {
    let unit = state.services.units.get(&actor, &parse_id(&id)?)?;
    Ok(Json(UnitRes::from(&unit)))
}

#[utoipa::path(
    put,
    path = "/units/{id}",
    request_body = UnitReq,
    responses(
        (status = 200, description = "Unit updated", body = UnitRes),
        (status = 404, description = "No such unit")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_unit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<UnitReq>,
) -> ApiResult<Json<UnitRes>> {
    let unit = state
        .services
        .units
        .update(&actor, &parse_id(&id)?, &UnitInput::from(req))?;
    Ok(Json(UnitRes::from(&unit)))
}

#[utoipa::path(
    delete,
    path = "/units/{id}",
    responses(
        (status = 204, description = "Unit deleted"),
        (status = 409, description = "Unit still referenced by agents or requisitions")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_unit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.units.delete(&actor, &parse_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/agents",
    params(CatalogQuery),
    responses((status = 200, description = "Health agents sorted by name", body = ListAgentsRes))
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_agents(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<ListAgentsRes>> {
    let unit_id = parse_optional_id("unit_id", query.unit_id.as_deref())?;
    let agents = state
        .services
        .agents
        .list(&actor, unit_id.as_ref(), query.include_inactive)?;
    Ok(Json(ListAgentsRes {
        agents: agents.iter().map(AgentRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/agents",
    request_body = AgentReq,
    responses(
        (status = 201, description = "Agent created", body = AgentRes),
        (status = 400, description = "Invalid fields or unknown unit")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_agent(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<AgentReq>,
) -> ApiResult<(StatusCode, Json<AgentRes>)> {
    let agent = state.services.agents.create(&actor, &AgentInput::from(req))?;
    tracing::info!(agent_id = %agent.id, "health agent created");
    Ok((StatusCode::CREATED, Json(AgentRes::from(&agent))))
}

#[utoipa::path(
    get,
    path = "/agents/{id}",
    responses(
        (status = 200, description = "The agent", body = AgentRes),
        (status = 404, description = "No such agent")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_agent(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentRes>> {
    let agent = state.services.agents.get(&actor, &parse_id(&id)?)?;
    Ok(Json(AgentRes::from(&agent)))
}

#[utoipa::path(
    put,
    path = "/agents/{id}",
    request_body = AgentReq,
    responses(
        (status = 200, description = "Agent updated", body = AgentRes),
        (status = 404, description = "No such agent")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_agent(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<AgentReq>,
) -> ApiResult<Json<AgentRes>> {
    let agent = state
        .services
        .agents
        .update(&actor, &parse_id(&id)?, &AgentInput::from(req))?;
    Ok(Json(AgentRes::from(&agent)))
}

#[utoipa::path(
    delete,
    path = "/agents/{id}",
    responses(
        (status = 204, description = "Agent deleted"),
        (status = 409, description = "Agent still referenced by requisitions")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_agent(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.agents.delete(&actor, &parse_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Procedure groups and procedures
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/procedure-groups",
    responses((status = 200, description = "Procedure groups sorted by name", body = ListGroupsRes))
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_groups(
    State(state): State<AppState>,
    Caller(actor): Caller,
) -> ApiResult<Json<ListGroupsRes>> {
    let groups = state.services.procedures.list_groups(&actor)?;
    Ok(Json(ListGroupsRes {
        groups: groups.iter().map(GroupRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/procedure-groups",
    request_body = GroupReq,
    responses(
        (status = 201, description = "Group created", body = GroupRes),
        (status = 409, description = "Name already used")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_group(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<GroupReq>,
) -> ApiResult<(StatusCode, Json<GroupRes>)> {
    let group = state
        .services
        .procedures
        .create_group(&actor, &GroupInput::from(req))?;
    Ok((StatusCode::CREATED, Json(GroupRes::from(&group))))
}

#[utoipa::path(
    delete,
    path = "/procedure-groups/{id}",
    responses(
        (status = 204, description = "Group deleted"),
        (status = 409, description = "Group still has procedures")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_group(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .services
        .procedures
        .delete_group(&actor, &parse_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/procedures",
    params(CatalogQuery),
    responses((status = 200, description = "Procedures sorted by name", body = ListProceduresRes))
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_procedures(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<ListProceduresRes>> {
    let group_id = parse_optional_id("group_id", query.group_id.as_deref())?;
    let procedures =
        state
            .services
            .procedures
            .list(&actor, group_id.as_ref(), query.include_inactive)?;
    Ok(Json(ListProceduresRes {
        procedures: procedures.iter().map(ProcedureRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/procedures",
    request_body = ProcedureReq,
    responses(
        (status = 201, description = "Procedure created", body = ProcedureRes),
        (status = 400, description = "Invalid fields or unknown group")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_procedure(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(req): Json<ProcedureReq>,
) -> ApiResult<(StatusCode, Json<ProcedureRes>)> {
    let procedure = state
        .services
        .procedures
        .create(&actor, &ProcedureInput::from(req))?;
    Ok((StatusCode::CREATED, Json(ProcedureRes::from(&procedure))))
}

#[utoipa::path(
    get,
    path = "/procedures/{id}",
    responses(
        (status = 200, description = "The procedure", body = ProcedureRes),
        (status = 404, description = "No such procedure")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_procedure(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcedureRes>> {
    let procedure = state.services.procedures.get(&actor, &parse_id(&id)?)?;
    Ok(Json(ProcedureRes::from(&procedure)))
}

#[utoipa::path(
    put,
    path = "/procedures/{id}",
    request_body = ProcedureReq,
    responses(
        (status = 200, description = "Procedure updated", body = ProcedureRes),
        (status = 404, description = "No such procedure")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_procedure(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    Json(req): Json<ProcedureReq>,
) -> ApiResult<Json<ProcedureRes>> {
    let procedure = state.services.procedures.update(
        &actor,
        &parse_id(&id)?,
        &ProcedureInput::from(req),
    )?;
    Ok(Json(ProcedureRes::from(&procedure)))
}

#[utoipa::path(
    delete,
    path = "/procedures/{id}",
    responses(
        (status = 204, description = "Procedure deleted"),
        (status = 409, description = "Procedure used by a requisition")
    )
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_procedure(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.procedures.delete(&actor, &parse_id(&id)?)?;
    Ok(StatusCode::NO_CONTENT)
}
