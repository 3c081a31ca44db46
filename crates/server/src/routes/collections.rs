use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use reshard_core::{CollectionEntry, NamespaceString};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCollectionRequest {
    pub ns: NamespaceString,
    pub uuid: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/collections",
    responses(
        (status = 200, description = "Local catalog", body = Vec<CollectionEntry>)
    ),
    tag = "catalog"
)]
pub async fn list_collections(
    State(state): State<AppState>,
) -> Result<Json<Vec<CollectionEntry>>, AppError> {
    Ok(Json(state.catalog_repository.list().await?))
}

#[utoipa::path(
    post,
    path = "/api/collections",
    request_body = CreateCollectionRequest,
    responses(
        (status = 201, description = "Collection registered", body = CollectionEntry),
        (status = 409, description = "Namespace already holds another collection")
    ),
    tag = "catalog"
)]
pub async fn create_collection(
    State(state): State<AppState>,
    Json(payload): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionEntry>), AppError> {
    let uuid = payload.uuid.unwrap_or_else(Uuid::new_v4);
    let entry = state
        .catalog_repository
        .create_collection(&payload.ns, uuid)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
