//! Device link API endpoints.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use linkup_core::{ConnectionMap, LinkupError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::devices::validated_address;
use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the connections router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_connections))
        .route("/{address}", get(get_connection))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Link status of every device that has connected or disconnected.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "connections": {
        "AA:BB:CC:DD:EE:01": false,
        "AA:BB:CC:DD:EE:02": true
    },
    "connected_count": 1
}))]
pub struct ConnectionsResponse {
    /// Device address to link status.
    pub connections: ConnectionMap,

    /// Number of devices currently linked.
    #[schema(example = 1)]
    pub connected_count: usize,
}

/// Link status of one device.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:02",
    "connected": true
}))]
pub struct ConnectionResponse {
    /// Device address as tracked.
    #[schema(example = "AA:BB:CC:DD:EE:02")]
    pub address: String,

    /// Status from the most recent link event.
    #[schema(example = true)]
    pub connected: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// List link status for all devices.
#[utoipa::path(
    get,
    path = "/api/connections",
    tag = "connections",
    operation_id = "getConnections",
    summary = "List device link status",
    description = "Returns the status from the most recent link event of every \
        device that has had one. Discovery alone does not create an entry.",
    responses(
        (status = 200, description = "Link status per device", body = ConnectionsResponse)
    )
)]
pub async fn get_connections(State(state): State<SharedState>) -> Json<ConnectionsResponse> {
    let connections = state.tracker.connection_status();
    let connected_count = connections.values().filter(|connected| **connected).count();

    Json(ConnectionsResponse {
        connections,
        connected_count,
    })
}

/// Get link status for one device.
#[utoipa::path(
    get,
    path = "/api/connections/{address}",
    tag = "connections",
    operation_id = "getConnection",
    summary = "Get one device's link status",
    params(
        ("address" = String, Path, description = "Device address, e.g. AA:BB:CC:DD:EE:FF")
    ),
    responses(
        (status = 200, description = "Link status of the device", body = ConnectionResponse),
        (status = 400, description = "Malformed address", body = ErrorResponse),
        (status = 404, description = "Device never had a link event", body = ErrorResponse)
    )
)]
pub async fn get_connection(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<ConnectionResponse>> {
    let candidates = validated_address(&address)?;

    candidates
        .into_iter()
        .find_map(|candidate| {
            state
                .tracker
                .is_connected(&candidate)
                .map(|connected| ConnectionResponse {
                    address: candidate,
                    connected,
                })
        })
        .map(Json)
        .ok_or_else(|| ApiError::from(LinkupError::DeviceNotFound(address)))
}
