use crate::AppState;
use api_shared::dto::HealthRes;
use api_shared::HealthService;
use axum::response::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks; needs no credentials.
#[axum::debug_handler(state = AppState)]
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}
