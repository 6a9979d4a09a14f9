//! REST API handlers.
//!
//! Each handler forwards to the underlying `CloudPool` and returns JSON
//! responses; pool errors are mapped onto HTTP status codes.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use fleet_core::{CloudPool, PoolError, ServiceState};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn status_for(error: &PoolError) -> StatusCode {
    match error {
        PoolError::InvalidArgument(_) | PoolError::Configuration(_) => StatusCode::BAD_REQUEST,
        PoolError::NotFound(_) => StatusCode::NOT_FOUND,
        PoolError::NotConfigured => StatusCode::CONFLICT,
        PoolError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        PoolError::Transient(_) | PoolError::RetryLimitExceeded { .. } => StatusCode::BAD_GATEWAY,
        PoolError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &PoolError) -> axum::response::Response {
    (
        status_for(error),
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }),
    )
        .into_response()
}

// ── Pool observation ───────────────────────────────────────────

/// GET /api/v1/pool
pub async fn get_pool<P: CloudPool>(State(state): State<ApiState<P>>) -> impl IntoResponse {
    match state.pool.get_machine_pool().await {
        Ok(pool) => ApiResponse::ok(pool).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/v1/pool/size
pub async fn get_pool_size<P: CloudPool>(State(state): State<ApiState<P>>) -> impl IntoResponse {
    match state.pool.get_pool_size().await {
        Ok(size) => ApiResponse::ok(size).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Resizing ───────────────────────────────────────────────────

/// Resize request body.
#[derive(serde::Deserialize)]
pub struct SetDesiredSizeRequest {
    pub desired_size: i64,
}

/// POST /api/v1/pool/size
pub async fn set_desired_size<P: CloudPool>(
    State(state): State<ApiState<P>>,
    Json(req): Json<SetDesiredSizeRequest>,
) -> impl IntoResponse {
    match state.pool.set_desired_size(req.desired_size).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "desired_size": req.desired_size,
            "status": "accepted"
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Machine operations ─────────────────────────────────────────

/// Body for terminate/detach requests.
#[derive(serde::Deserialize, Default)]
pub struct MachineRemovalRequest {
    #[serde(default)]
    pub decrement_desired_size: bool,
}

/// POST /api/v1/pool/machines/:id/terminate
pub async fn terminate_machine<P: CloudPool>(
    State(state): State<ApiState<P>>,
    Path(id): Path<String>,
    Json(req): Json<MachineRemovalRequest>,
) -> impl IntoResponse {
    match state
        .pool
        .terminate_machine(&id, req.decrement_desired_size)
        .await
    {
        Ok(()) => ApiResponse::ok("terminated").into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/pool/machines/:id/attach
pub async fn attach_machine<P: CloudPool>(
    State(state): State<ApiState<P>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.pool.attach_machine(&id).await {
        Ok(()) => ApiResponse::ok("attached").into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /api/v1/pool/machines/:id/detach
pub async fn detach_machine<P: CloudPool>(
    State(state): State<ApiState<P>>,
    Path(id): Path<String>,
    Json(req): Json<MachineRemovalRequest>,
) -> impl IntoResponse {
    match state
        .pool
        .detach_machine(&id, req.decrement_desired_size)
        .await
    {
        Ok(()) => ApiResponse::ok("detached").into_response(),
        Err(e) => error_response(&e),
    }
}

/// Service state request body.
#[derive(serde::Deserialize)]
pub struct ServiceStateRequest {
    pub service_state: ServiceState,
}

/// POST /api/v1/pool/machines/:id/service_state
pub async fn set_service_state<P: CloudPool>(
    State(state): State<ApiState<P>>,
    Path(id): Path<String>,
    Json(req): Json<ServiceStateRequest>,
) -> impl IntoResponse {
    match state.pool.set_service_state(&id, req.service_state).await {
        Ok(()) => ApiResponse::ok("recorded").into_response(),
        Err(e) => error_response(&e),
    }
}
