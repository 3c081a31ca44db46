use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use donor::{DonorError, DonorStateMachine};
use reshard_core::{
    CoordinatorState, DonorState, DonorStateDocument, NamespaceString, ShardId,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDonorRequest {
    #[serde(rename = "reshardingUUID")]
    pub resharding_uuid: Uuid,
    pub source_nss: NamespaceString,
    #[serde(rename = "sourceUUID")]
    pub source_uuid: Uuid,
    #[schema(value_type = Object)]
    pub resharding_key: serde_json::Value,
    pub recipient_shards: Vec<ShardId>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStatus {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonorResponse {
    pub document: DonorStateDocument,
    /// Whether an instance is currently running on this primary.
    pub live: bool,
    pub coordinator_state: Option<CoordinatorState>,
    pub completion: Option<CompletionStatus>,
}

impl DonorResponse {
    fn new(document: DonorStateDocument, instance: Option<&DonorStateMachine>) -> Self {
        // Finished instances leave the registry; a `Done` document without
        // one completed successfully.
        let completion = match instance {
            Some(donor) => donor
                .completion_future()
                .try_get()
                .map(|outcome| CompletionStatus {
                    success: outcome.is_ok(),
                    error: outcome.err().map(|e| e.to_string()),
                }),
            None if document.state().is_terminal() => Some(CompletionStatus {
                success: true,
                error: None,
            }),
            None => None,
        };

        Self {
            document,
            live: instance.is_some(),
            coordinator_state: instance.and_then(DonorStateMachine::coordinator_state),
            completion,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonorReportResponse {
    pub shard_id: ShardId,
    pub state: DonorState,
    pub abort_reason: Option<String>,
    pub min_fetch_timestamp: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/api/donors",
    responses(
        (status = 200, description = "All persisted donor documents", body = Vec<DonorResponse>)
    ),
    tag = "donors"
)]
pub async fn list_donors(
    State(state): State<AppState>,
) -> Result<Json<Vec<DonorResponse>>, AppError> {
    let docs = state.donor_repository.find_all().await?;
    let donors = docs
        .into_iter()
        .map(|doc| {
            let instance = state.donor_service.lookup(doc.resharding_uuid);
            DonorResponse::new(doc, instance.as_deref())
        })
        .collect();
    Ok(Json(donors))
}

#[utoipa::path(
    post,
    path = "/api/donors",
    request_body = CreateDonorRequest,
    responses(
        (status = 201, description = "Donor inserted and started", body = DonorResponse),
        (status = 400, description = "Invalid document"),
        (status = 409, description = "Operation already exists"),
        (status = 503, description = "Shard is not primary")
    ),
    tag = "donors"
)]
pub async fn create_donor(
    State(state): State<AppState>,
    Json(payload): Json<CreateDonorRequest>,
) -> Result<(StatusCode, Json<DonorResponse>), AppError> {
    if !state.donor_service.is_primary() {
        return Err(DonorError::NotPrimary.into());
    }

    let doc = DonorStateDocument::new(
        payload.resharding_uuid,
        payload.source_nss,
        payload.source_uuid,
        payload.resharding_key,
        payload.recipient_shards,
    )?;

    state.donor_service.insert_state_document(&doc).await?;
    let donor = state.donor_service.get_or_create(&doc).await?;

    Ok((
        StatusCode::CREATED,
        Json(DonorResponse::new(donor.document(), Some(donor.as_ref()))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/donors/{id}",
    params(
        ("id" = Uuid, Path, description = "Resharding operation UUID")
    ),
    responses(
        (status = 200, description = "Donor document and live status", body = DonorResponse),
        (status = 404, description = "Donor not found")
    ),
    tag = "donors"
)]
pub async fn get_donor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DonorResponse>, AppError> {
    let Some(doc) = state.donor_repository.find_by_id(id).await? else {
        return Err(AppError::NotFound(format!("Donor not found: {}", id)));
    };

    let instance = state.donor_service.lookup(id);
    Ok(Json(DonorResponse::new(doc, instance.as_deref())))
}

#[utoipa::path(
    delete,
    path = "/api/donors/{id}",
    params(
        ("id" = Uuid, Path, description = "Resharding operation UUID")
    ),
    responses(
        (status = 204, description = "Finished donor document removed"),
        (status = 404, description = "Donor not found"),
        (status = 409, description = "Donor has not finished")
    ),
    tag = "donors"
)]
pub async fn delete_donor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let Some(doc) = state.donor_repository.find_by_id(id).await? else {
        return Err(AppError::NotFound(format!("Donor not found: {}", id)));
    };

    if !doc.state().is_terminal() {
        return Err(AppError::Conflict(format!(
            "Donor {} is still in state {}",
            id,
            doc.state().as_str()
        )));
    }

    state.donor_repository.delete(id).await?;
    state.donor_service.forget(id);
    tracing::info!(resharding_uuid = %id, "Reaped finished donor document");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/donors/{id}/reports",
    params(
        ("id" = Uuid, Path, description = "Resharding operation UUID")
    ),
    responses(
        (status = 200, description = "Reports sent to the coordinator", body = Vec<DonorReportResponse>)
    ),
    tag = "donors"
)]
pub async fn list_donor_reports(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DonorReportResponse>>, AppError> {
    let reports = state.coordinator_repository.find_by_operation(id).await?;
    Ok(Json(
        reports
            .into_iter()
            .map(|r| DonorReportResponse {
                shard_id: r.shard_id,
                state: r.context.state,
                abort_reason: r.context.abort_reason,
                min_fetch_timestamp: r.context.min_fetch_timestamp,
                updated_at: r.updated_at,
            })
            .collect(),
    ))
}
