//! # API REST
//!
//! REST API implementation for the requisition tracker.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, multipart uploads, CORS, request identity)
//!
//! Uses `api-shared` for wire types and `reqtrack-core` for every business rule.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod identity;
pub mod routes;
mod upload;

use api_shared::dto;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use reqtrack_core::{AttachmentBackends, Services};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::{ApiError, ApiResult};

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub attachments: Arc<AttachmentBackends>,
    /// Expected value of the `x-api-key` header.
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(services: Services, attachments: AttachmentBackends, api_key: &str) -> Self {
        Self {
            services,
            attachments: Arc::new(attachments),
            api_key: Arc::from(api_key),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::users::me,
        routes::users::register,
        routes::users::list_users,
        routes::users::set_role,
        routes::users::assign_unit,
        routes::catalog::list_units,
        routes::catalog::create_unit,
        routes::catalog::get_unit,
        routes::catalog::update_unit,
        routes::catalog::delete_unit,
        routes::catalog::list_agents,
        routes::catalog::create_agent,
        routes::catalog::get_agent,
        routes::catalog::update_agent,
        routes::catalog::delete_agent,
        routes::catalog::list_groups,
        routes::catalog::create_group,
        routes::catalog::delete_group,
        routes::catalog::list_procedures,
        routes::catalog::create_procedure,
        routes::catalog::get_procedure,
        routes::catalog::update_procedure,
        routes::catalog::delete_procedure,
        routes::requisitions::list_requisitions,
        routes::requisitions::create_requisition,
        routes::requisitions::summary,
        routes::requisitions::get_requisition,
        routes::requisitions::transition,
        routes::requisitions::update_notes,
        routes::requisitions::upload_image,
        routes::requisitions::delete_image,
        routes::drafts::create_draft,
        routes::drafts::list_drafts,
        routes::drafts::get_draft,
        routes::drafts::delete_draft,
        routes::drafts::apply_action,
        routes::drafts::upload_image,
        routes::drafts::submit_draft,
        routes::files::upload_file,
        routes::files::list_files,
        routes::files::delete_file,
    ),
    components(schemas(
        dto::HealthRes,
        dto::ErrorBody,
        dto::FieldErrorDto,
        dto::RegisterUserReq,
        dto::UserRes,
        dto::ListUsersRes,
        dto::SetRoleReq,
        dto::AssignUnitReq,
        dto::UnitReq,
        dto::UnitRes,
        dto::ListUnitsRes,
        dto::AgentReq,
        dto::AgentRes,
        dto::ListAgentsRes,
        dto::GroupReq,
        dto::GroupRes,
        dto::ListGroupsRes,
        dto::ProcedureReq,
        dto::ProcedureRes,
        dto::ListProceduresRes,
        dto::PatientDto,
        dto::ProcedureLineDto,
        dto::ImageRefDto,
        dto::CreateRequisitionReq,
        dto::ScheduleDto,
        dto::HistoryEntryDto,
        dto::RequisitionRes,
        dto::ListRequisitionsRes,
        dto::SummaryRes,
        dto::TransitionReq,
        dto::NotesReq,
        dto::DraftRes,
        dto::ListDraftsRes,
        dto::StoredFileRes,
        dto::FileEntryRes,
        dto::ListFilesRes,
        dto::DeleteFileRes,
    ))
)]
pub struct ApiDoc;

/// Builds the full router: API routes, Swagger UI and permissive CORS.
///
/// `max_upload_bytes` bounds every request body, multipart uploads included.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    use routes::{catalog, drafts, files, health, requisitions, users};

    Router::new()
        .route("/health", get(health::health))
        .route("/me", get(users::me))
        .route("/users", get(users::list_users))
        .route("/users/register", post(users::register))
        .route("/users/:id/role", put(users::set_role))
        .route("/users/:id/unit", put(users::assign_unit))
        .route("/units", get(catalog::list_units).post(catalog::create_unit))
        .route(
            "/units/:id",
            get(catalog::get_unit)
                .put(catalog::update_unit)
                .delete(catalog::delete_unit),
        )
        .route("/agents", get(catalog::list_agents).post(catalog::create_agent))
        .route(
            "/agents/:id",
            get(catalog::get_agent)
                .put(catalog::update_agent)
                .delete(catalog::delete_agent),
        )
        .route(
            "/procedure-groups",
            get(catalog::list_groups).post(catalog::create_group),
        )
        .route(
            "/procedure-groups/:id",
            axum::routing::delete(catalog::delete_group),
        )
        .route(
            "/procedures",
            get(catalog::list_procedures).post(catalog::create_procedure),
        )
        .route(
            "/procedures/:id",
            get(catalog::get_procedure)
                .put(catalog::update_procedure)
                .delete(catalog::delete_procedure),
        )
        .route(
            "/requisitions",
            get(requisitions::list_requisitions).post(requisitions::create_requisition),
        )
        .route("/requisitions/summary", get(requisitions::summary))
        .route("/requisitions/:id", get(requisitions::get_requisition))
        .route(
            "/requisitions/:id/transitions",
            post(requisitions::transition),
        )
        .route("/requisitions/:id/notes", put(requisitions::update_notes))
        .route("/requisitions/:id/images", post(requisitions::upload_image))
        .route(
            "/requisitions/:id/images/:client_id",
            axum::routing::delete(requisitions::delete_image),
        )
        .route("/drafts", get(drafts::list_drafts).post(drafts::create_draft))
        .route(
            "/drafts/:id",
            get(drafts::get_draft).delete(drafts::delete_draft),
        )
        .route("/drafts/:id/actions", post(drafts::apply_action))
        .route("/drafts/:id/images", post(drafts::upload_image))
        .route("/drafts/:id/submit", post(drafts::submit_draft))
        .route("/files/:backend", post(files::upload_file))
        .route("/files/:backend/:folder", get(files::list_files))
        .route(
            "/files/:backend/:folder/:name",
            axum::routing::delete(files::delete_file),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
