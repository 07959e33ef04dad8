//! Adapter API endpoints.
//!
//! Reports the local radio's power state and forwards enable requests to the
//! Bluetooth host.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use linkup_core::{AdapterState, LinkupError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the adapter router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_adapter))
        .route("/enable", post(enable_adapter))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Adapter state response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "state": "on",
    "enabled": true
}))]
pub struct AdapterResponse {
    /// Last reported power state; `unknown` until the host reports one.
    pub state: AdapterState,

    /// `true` only when the adapter is known to be on.
    #[schema(example = true)]
    pub enabled: bool,
}

/// Enable request response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "requested": true,
    "state": "off"
}))]
pub struct EnableAdapterResponse {
    /// Whether the request was handed to the host.
    #[schema(example = true)]
    pub requested: bool,

    /// Adapter state at the time of the request. The outcome is reported
    /// later through `/api/adapter` and the presence stream.
    pub state: AdapterState,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the adapter power state.
#[utoipa::path(
    get,
    path = "/api/adapter",
    tag = "adapter",
    operation_id = "getAdapter",
    summary = "Get adapter power state",
    responses(
        (status = 200, description = "Current adapter state", body = AdapterResponse)
    )
)]
pub async fn get_adapter(State(state): State<SharedState>) -> Json<AdapterResponse> {
    let adapter = state.tracker.adapter_state();
    Json(AdapterResponse {
        state: adapter,
        enabled: adapter.is_enabled(),
    })
}

/// Ask the host to enable the adapter.
#[utoipa::path(
    post,
    path = "/api/adapter/enable",
    tag = "adapter",
    operation_id = "enableAdapter",
    summary = "Request the adapter be turned on",
    description = "Forwards an enable request to the Bluetooth host. The request \
        is forwarded even when the adapter is already on. Acceptance is not \
        awaited: the resulting power state arrives as an adapter change.",
    responses(
        (status = 202, description = "Request forwarded to the host", body = EnableAdapterResponse),
        (status = 503, description = "The host could not issue the request", body = ErrorResponse)
    )
)]
pub async fn enable_adapter(
    State(state): State<SharedState>,
) -> ApiResult<(StatusCode, Json<EnableAdapterResponse>)> {
    let current = state.tracker.adapter_state();
    if !state.tracker.request_adapter_enable() {
        return Err(ApiError::from(LinkupError::EnableRequestFailed(
            "the Bluetooth host rejected the request".to_string(),
        )));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(EnableAdapterResponse {
            requested: true,
            state: current,
        }),
    ))
}
