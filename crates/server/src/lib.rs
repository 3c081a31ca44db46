pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Resharding Donor API",
        version = "0.1.0",
        description = "Admin surface of a shard donating its collection to a resharding operation"
    ),
    paths(
        routes::health_check,
        routes::donors::list_donors,
        routes::donors::create_donor,
        routes::donors::get_donor,
        routes::donors::delete_donor,
        routes::donors::list_donor_reports,
        routes::coordinator::post_notification,
        routes::collections::list_collections,
        routes::collections::create_collection,
        routes::oplog::list_oplog,
        routes::replication::get_role,
        routes::replication::step_up,
        routes::replication::step_down,
        routes::sse::events_stream,
    ),
    components(schemas(
        routes::HealthResponse,
        routes::donors::CreateDonorRequest,
        routes::donors::DonorResponse,
        routes::donors::CompletionStatus,
        routes::donors::DonorReportResponse,
        routes::coordinator::RoutingResponse,
        routes::collections::CreateCollectionRequest,
        routes::replication::RoleResponse,
        reshard_core::DonorStateDocument,
        reshard_core::DonorShardContext,
        reshard_core::DonorState,
        reshard_core::CoordinatorState,
        reshard_core::CoordinatorPhaseNotification,
        reshard_core::DonorFields,
        reshard_core::CollectionEntry,
        reshard_core::OplogEntry,
        reshard_core::OpType,
        reshard_core::NamespaceString,
        reshard_core::ShardId,
    )),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "donors", description = "Donor state documents and live instances"),
        (name = "coordinator", description = "Coordinator phase notifications"),
        (name = "catalog", description = "Local collection catalog"),
        (name = "oplog", description = "Oplog inspection"),
        (name = "replication", description = "Primary role transitions"),
        (name = "events", description = "Real-time event streaming (SSE)"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/openapi.json", get(openapi_json))
        .route(
            "/api/donors",
            get(routes::donors::list_donors).post(routes::donors::create_donor),
        )
        .route(
            "/api/donors/{id}",
            get(routes::donors::get_donor).delete(routes::donors::delete_donor),
        )
        .route(
            "/api/donors/{id}/reports",
            get(routes::donors::list_donor_reports),
        )
        .route(
            "/api/coordinator/notifications",
            post(routes::coordinator::post_notification),
        )
        .route(
            "/api/collections",
            get(routes::collections::list_collections).post(routes::collections::create_collection),
        )
        .route("/api/oplog", get(routes::oplog::list_oplog))
        .route("/api/replication", get(routes::replication::get_role))
        .route("/api/replication/step-up", post(routes::replication::step_up))
        .route(
            "/api/replication/step-down",
            post(routes::replication::step_down),
        )
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
