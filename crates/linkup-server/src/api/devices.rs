//! Discovered device API endpoints.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use linkup_core::{is_valid_address, DiscoveredDevice, LinkupError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the devices router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_devices))
        .route("/{address}", get(get_device))
}

/// Check a path address and return the keys to look it up under.
///
/// Hosts report addresses in upper case, so the upper-cased form is tried
/// after the address as given.
pub(crate) fn validated_address(address: &str) -> ApiResult<Vec<String>> {
    if !is_valid_address(address) {
        return Err(ApiError::from(LinkupError::InvalidAddress(
            address.to_string(),
        )));
    }

    let mut candidates = vec![address.to_string()];
    let upper = address.to_ascii_uppercase();
    if upper != address {
        candidates.push(upper);
    }
    Ok(candidates)
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Discovered devices response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "devices": [
        {
            "address": "AA:BB:CC:DD:EE:FF",
            "display_name": "Pixel 8",
            "first_seen_at": "2025-01-15T03:30:00Z"
        }
    ],
    "count": 1
}))]
pub struct DevicesResponse {
    /// Discovered devices ordered by address.
    pub devices: Vec<DiscoveredDevice>,

    /// Number of devices.
    #[schema(example = 1)]
    pub count: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// List discovered devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    operation_id = "getDevices",
    summary = "List discovered devices",
    description = "Returns every device discovered since the tracker was created \
        or last reset, one entry per address. Being listed here does not mean a \
        device is linked.",
    responses(
        (status = 200, description = "Discovered devices", body = DevicesResponse)
    )
)]
pub async fn get_devices(State(state): State<SharedState>) -> Json<DevicesResponse> {
    let devices = state.tracker.discovered_devices();
    Json(DevicesResponse {
        count: devices.len(),
        devices,
    })
}

/// Get one discovered device.
#[utoipa::path(
    get,
    path = "/api/devices/{address}",
    tag = "devices",
    operation_id = "getDevice",
    summary = "Get one discovered device",
    params(
        ("address" = String, Path, description = "Device address, e.g. AA:BB:CC:DD:EE:FF")
    ),
    responses(
        (status = 200, description = "Discovery record", body = DiscoveredDevice),
        (status = 400, description = "Malformed address", body = ErrorResponse),
        (status = 404, description = "Device never discovered", body = ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<Json<DiscoveredDevice>> {
    validated_address(&address)?
        .iter()
        .find_map(|candidate| state.tracker.discovered_device(candidate))
        .map(Json)
        .ok_or_else(|| ApiError::from(LinkupError::DeviceNotFound(address)))
}
