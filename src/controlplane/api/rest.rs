//! REST API Handlers
//!
//! JSON facade over the orchestrator: volumes, snapshots, capacity,
//! health and metrics.

use crate::config::MountFsType;
use crate::controlplane::orchestrator::{
    BackendStatus, CreateVolumeRequest, Orchestrator, ShareInfo, Volume, VolumeSnapshot,
};
use crate::controlplane::pagination::Page;
use crate::error::{Error, RpcCode};
use crate::metrics::gather_text;
use axum::{
    extract::{Json, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request naming one volume or snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandVolumeRequest {
    pub id: String,
    pub capacity_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandVolumeResponse {
    pub capacity_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub id: String,
    #[serde(default)]
    pub mount_fs_type: Option<MountFsType>,
    #[serde(default)]
    pub data_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    pub source_volume_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListVolumesQuery {
    pub max_entries: usize,
    pub starting_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListSnapshotsQuery {
    pub snapshot_id: Option<String>,
    pub source_volume_id: Option<String>,
    pub max_entries: usize,
    pub starting_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacityQuery {
    pub config_name: Option<String>,
    pub dataset: Option<String>,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityResponse {
    pub available_capacity_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub ready: bool,
    pub backends: Vec<BackendStatus>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Driver error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

/// HTTP status for an orchestrator status code
pub fn http_status(code: RpcCode) -> StatusCode {
    match code {
        RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
        RpcCode::NotFound => StatusCode::NOT_FOUND,
        RpcCode::AlreadyExists | RpcCode::Aborted => StatusCode::CONFLICT,
        RpcCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        RpcCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        RpcCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        RpcCode::Cancelled | RpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        RpcCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let status = http_status(code);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected ({}): {}", code, self.0);
        }
        (
            status,
            Json(ApiErrorResponse {
                error: code.to_string(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
}

impl RestRouter {
    /// Create a new REST router; cancelling `shutdown` cancels every
    /// in-flight operation
    pub fn new(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            shutdown,
        }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator,
            shutdown: self.shutdown,
        };

        Router::new()
            // Volume endpoints
            .route("/v1/volumes", post(create_volume).get(list_volumes))
            .route("/v1/volumes/delete", post(delete_volume))
            .route("/v1/volumes/expand", post(expand_volume))
            .route("/v1/volumes/validate", post(validate_volume))
            .route("/v1/volumes/share", post(prepare_share))
            // Snapshot endpoints
            .route("/v1/snapshots", post(create_snapshot).get(list_snapshots))
            .route("/v1/snapshots/delete", post(delete_snapshot))
            // Capacity endpoint
            .route("/v1/capacity", get(get_capacity))
            // Health and metrics
            .route("/healthz", get(health_check))
            .route("/readyz", get(readiness_check))
            .route("/metrics", get(metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
}

impl AppState {
    fn cancel(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_volume(
    State(state): State<AppState>,
    Json(request): Json<CreateVolumeRequest>,
) -> ApiResult<(StatusCode, Json<Volume>)> {
    info!("API create volume: {}", request.name);
    let volume = state
        .orchestrator
        .create_volume(request, &state.cancel())
        .await?;
    Ok((StatusCode::CREATED, Json(volume)))
}

async fn list_volumes(
    State(state): State<AppState>,
    Query(query): Query<ListVolumesQuery>,
) -> ApiResult<Json<Page<Volume>>> {
    let page = state
        .orchestrator
        .list_volumes(query.max_entries, query.starting_token.as_deref(), &state.cancel())
        .await?;
    Ok(Json(page))
}

async fn delete_volume(
    State(state): State<AppState>,
    Json(request): Json<IdRequest>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .delete_volume(&request.id, &state.cancel())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn expand_volume(
    State(state): State<AppState>,
    Json(request): Json<ExpandVolumeRequest>,
) -> ApiResult<Json<ExpandVolumeResponse>> {
    let capacity_bytes = state
        .orchestrator
        .expand_volume(&request.id, request.capacity_bytes, &state.cancel())
        .await?;
    Ok(Json(ExpandVolumeResponse { capacity_bytes }))
}

async fn validate_volume(
    State(state): State<AppState>,
    Json(request): Json<IdRequest>,
) -> ApiResult<Json<Volume>> {
    let volume = state
        .orchestrator
        .validate_volume(&request.id, &state.cancel())
        .await?;
    Ok(Json(volume))
}

async fn prepare_share(
    State(state): State<AppState>,
    Json(request): Json<ShareRequest>,
) -> ApiResult<Json<ShareInfo>> {
    let share = state
        .orchestrator
        .prepare_share(
            &request.id,
            request.mount_fs_type,
            request.data_ip.as_deref(),
            &state.cancel(),
        )
        .await?;
    Ok(Json(share))
}

async fn create_snapshot(
    State(state): State<AppState>,
    Json(request): Json<CreateSnapshotRequest>,
) -> ApiResult<(StatusCode, Json<VolumeSnapshot>)> {
    info!(
        "API create snapshot: {}@{}",
        request.source_volume_id, request.name
    );
    let snapshot = state
        .orchestrator
        .create_snapshot(&request.source_volume_id, &request.name, &state.cancel())
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn list_snapshots(
    State(state): State<AppState>,
    Query(query): Query<ListSnapshotsQuery>,
) -> ApiResult<Json<Page<VolumeSnapshot>>> {
    let page = state
        .orchestrator
        .list_snapshots(
            query.snapshot_id.as_deref(),
            query.source_volume_id.as_deref(),
            query.max_entries,
            query.starting_token.as_deref(),
            &state.cancel(),
        )
        .await?;
    Ok(Json(page))
}

async fn delete_snapshot(
    State(state): State<AppState>,
    Json(request): Json<IdRequest>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .delete_snapshot(&request.id, &state.cancel())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_capacity(
    State(state): State<AppState>,
    Query(query): Query<CapacityQuery>,
) -> ApiResult<Json<CapacityResponse>> {
    let available_capacity_bytes = state
        .orchestrator
        .get_capacity(
            query.config_name.as_deref(),
            query.dataset.as_deref(),
            query.zone.as_deref(),
            &state.cancel(),
        )
        .await?;
    Ok(Json(CapacityResponse {
        available_capacity_bytes,
    }))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Ready when every backend answers with a valid license
async fn readiness_check(State(state): State<AppState>) -> ApiResult<Response> {
    let backends = state.orchestrator.check_backends(&state.cancel()).await?;
    let ready = !backends.is_empty() && backends.iter().all(|b| b.license_valid);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(ReadinessResponse { ready, backends })).into_response())
}

async fn metrics() -> ApiResult<Response> {
    let body = gather_text()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::BackendSet;
    use crate::controlplane::resolver::Resolver;
    use crate::domain::ports::NefProviderRef;
    use crate::testing::{backend_config, FakeProvider};
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn router(provider: &Arc<FakeProvider>) -> Router {
        let resolver = Resolver::new(
            "box1",
            backend_config(Some("pool/ds"), None),
            vec![provider.clone() as NefProviderRef],
        )
        .unwrap();
        let orchestrator = Orchestrator::with_backends(BackendSet::new(vec![Arc::new(resolver)]));
        RestRouter::new(orchestrator, CancellationToken::new()).build()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json<T: DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_delete_volume() {
        let appliance = FakeProvider::new("https://a").with_filesystem("pool/ds", GIB);
        let app = router(&appliance);

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/volumes",
                serde_json::json!({ "name": "pvc-1", "capacityBytes": GIB }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let volume: Volume = json(response).await;
        assert_eq!(volume.id, "box1:pool/ds/pvc-1");

        let response = app
            .clone()
            .oneshot(post_json(
                "/v1/volumes/delete",
                serde_json::json!({ "id": volume.id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!appliance.has_filesystem("pool/ds/pvc-1"));
    }

    #[tokio::test]
    async fn test_size_conflict_is_409() {
        let appliance = FakeProvider::new("https://a")
            .with_filesystem("pool/ds", GIB)
            .with_filesystem("pool/ds/pvc-1", GIB);
        let app = router(&appliance);

        let response = app
            .oneshot(post_json(
                "/v1/volumes",
                serde_json::json!({ "name": "pvc-1", "capacityBytes": 2 * GIB }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: ApiErrorResponse = json(response).await;
        assert_eq!(body.error, "already_exists");
    }

    #[tokio::test]
    async fn test_list_volumes_paged() {
        let appliance = FakeProvider::new("https://a")
            .with_filesystem("pool/ds", GIB)
            .with_filesystem("pool/ds/v1", GIB)
            .with_filesystem("pool/ds/v2", GIB)
            .with_filesystem("pool/ds/v3", GIB);
        let app = router(&appliance);

        let response = app
            .clone()
            .oneshot(get("/v1/volumes?maxEntries=2"))
            .await
            .unwrap();
        let page: Page<Volume> = json(response).await;
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.next_token.as_deref(), Some("box1:pool/ds/v2"));

        let response = app
            .oneshot(get("/v1/volumes?maxEntries=2&startingToken=box1%3Apool%2Fds%2Fv2"))
            .await
            .unwrap();
        let page: Page<Volume> = json(response).await;
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.next_token, None);
    }

    #[tokio::test]
    async fn test_readiness_reflects_license() {
        let appliance = FakeProvider::new("https://a");
        let app = router(&appliance);

        let response = app.clone().oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        appliance.set_license_valid(false);
        let response = app.oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: ReadinessResponse = json(response).await;
        assert!(!body.ready);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = router(&FakeProvider::new("https://a"));

        let response = app.clone().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(http_status(RpcCode::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(http_status(RpcCode::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(
            http_status(RpcCode::FailedPrecondition),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(http_status(RpcCode::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
