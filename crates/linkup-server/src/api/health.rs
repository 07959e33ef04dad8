//! Health check API endpoint.
//!
//! Provides a simple health check endpoint for monitoring and load balancers.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "tracker_running": true,
    "uptime_secs": 3600,
    "started_at_utc": "2025-01-15T03:30:00Z"
}))]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version from Cargo.toml.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Whether the presence tracker is consuming host events.
    #[schema(example = true)]
    pub tracker_running: bool,

    /// Seconds since the process started serving.
    #[schema(example = 3600)]
    pub uptime_secs: u64,

    /// When the process started serving.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub started_at_utc: String,
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/health", get(health_check))
}

/// Health check endpoint.
///
/// Returns basic service status information including version and
/// whether the tracker is running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    description = "Returns basic service status information. Use this endpoint \
        for load balancer health checks and monitoring. A stopped tracker does \
        not make the service unhealthy.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tracker_running: state.tracker.is_running(),
        uptime_secs: state.uptime().as_secs(),
        started_at_utc: state.started_at_utc().to_rfc3339(),
    })
}
