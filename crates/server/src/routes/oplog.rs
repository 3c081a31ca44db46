use axum::extract::{Query, State};
use axum::Json;
use db::OplogQuery;
use reshard_core::OplogEntry;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::AppError;
use crate::state::AppState;

const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize, IntoParams)]
pub struct OplogParams {
    /// Only entries for this namespace
    pub ns: Option<String>,
    /// Only entries after this position
    pub after: Option<i64>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/oplog",
    params(OplogParams),
    responses(
        (status = 200, description = "Oplog entries, oldest first", body = Vec<OplogEntry>)
    ),
    tag = "oplog"
)]
pub async fn list_oplog(
    State(state): State<AppState>,
    Query(params): Query<OplogParams>,
) -> Result<Json<Vec<OplogEntry>>, AppError> {
    let limit = params.limit.unwrap_or(MAX_LIMIT);
    if limit <= 0 {
        return Err(AppError::BadRequest("limit must be positive".to_string()));
    }

    let query = OplogQuery {
        ns: params.ns,
        after_ts: params.after,
        limit: Some(limit.min(MAX_LIMIT)),
    };
    Ok(Json(state.oplog_repository.find(&query).await?))
}
