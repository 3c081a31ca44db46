use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub primary: bool,
    /// Live instances after the change, or the number interrupted on step-down.
    pub instances: usize,
}

#[utoipa::path(
    get,
    path = "/api/replication",
    responses(
        (status = 200, description = "Current role", body = RoleResponse)
    ),
    tag = "replication"
)]
pub async fn get_role(State(state): State<AppState>) -> Json<RoleResponse> {
    Json(RoleResponse {
        primary: state.donor_service.is_primary(),
        instances: state.donor_service.instances().len(),
    })
}

#[utoipa::path(
    post,
    path = "/api/replication/step-up",
    responses(
        (status = 200, description = "Now primary; unfinished donors resumed", body = RoleResponse)
    ),
    tag = "replication"
)]
pub async fn step_up(State(state): State<AppState>) -> Result<Json<RoleResponse>, AppError> {
    let instances = state.donor_service.step_up().await?;
    Ok(Json(RoleResponse {
        primary: true,
        instances,
    }))
}

#[utoipa::path(
    post,
    path = "/api/replication/step-down",
    responses(
        (status = 200, description = "No longer primary; donors interrupted", body = RoleResponse)
    ),
    tag = "replication"
)]
pub async fn step_down(State(state): State<AppState>) -> Json<RoleResponse> {
    let interrupted = state.donor_service.step_down();
    Json(RoleResponse {
        primary: false,
        instances: interrupted,
    })
}
