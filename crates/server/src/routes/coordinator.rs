use axum::extract::State;
use axum::Json;
use donor::RoutingOutcome;
use reshard_core::CoordinatorPhaseNotification;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct RoutingResponse {
    #[schema(value_type = String, example = "delivered")]
    pub outcome: RoutingOutcome,
}

#[utoipa::path(
    post,
    path = "/api/coordinator/notifications",
    request_body = CoordinatorPhaseNotification,
    responses(
        (status = 200, description = "How the notification was routed", body = RoutingResponse)
    ),
    tag = "coordinator"
)]
pub async fn post_notification(
    State(state): State<AppState>,
    Json(notification): Json<CoordinatorPhaseNotification>,
) -> Json<RoutingResponse> {
    let outcome = state.watcher.on_fields_changed(&notification);
    tracing::debug!(
        resharding_uuid = %notification.resharding_uuid,
        coordinator_state = %notification.state.as_str(),
        ?outcome,
        "Routed coordinator notification"
    );
    Json(RoutingResponse { outcome })
}
