//! Tracker lifecycle API endpoints.
//!
//! These mirror the host lifecycle hooks: starting begins consuming host
//! events, stopping pauses it without clearing state.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use linkup_core::PresenceSnapshot;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the tracker router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_tracker))
        .route("/start", post(start_tracker))
        .route("/stop", post(stop_tracker))
        .route("/reset", post(reset_tracker))
}

/// Tracker lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "running": true }))]
pub struct TrackerResponse {
    /// Whether host events are being consumed.
    #[schema(example = true)]
    pub running: bool,
}

/// Get the tracker lifecycle status.
#[utoipa::path(
    get,
    path = "/api/tracker",
    tag = "tracker",
    operation_id = "getTracker",
    summary = "Get tracker status",
    responses(
        (status = 200, description = "Tracker status", body = TrackerResponse)
    )
)]
pub async fn get_tracker(State(state): State<SharedState>) -> Json<TrackerResponse> {
    Json(TrackerResponse {
        running: state.tracker.is_running(),
    })
}

/// Start consuming host events.
#[utoipa::path(
    post,
    path = "/api/tracker/start",
    tag = "tracker",
    operation_id = "startTracker",
    summary = "Start the tracker",
    description = "Registers with the Bluetooth host. Starting a running tracker \
        does nothing. Previously collected state is kept.",
    responses(
        (status = 200, description = "Tracker running", body = TrackerResponse),
        (status = 503, description = "The host refused the registration", body = ErrorResponse)
    )
)]
pub async fn start_tracker(State(state): State<SharedState>) -> ApiResult<Json<TrackerResponse>> {
    state.tracker.start();

    if !state.tracker.is_running() {
        return Err(ApiError::ServiceUnavailable {
            error_code: "TRACKER_START_FAILED".to_string(),
            message: "The Bluetooth host refused the event registration".to_string(),
            details: None,
        });
    }
    Ok(Json(TrackerResponse { running: true }))
}

/// Stop consuming host events.
#[utoipa::path(
    post,
    path = "/api/tracker/stop",
    tag = "tracker",
    operation_id = "stopTracker",
    summary = "Stop the tracker",
    description = "Unregisters from the Bluetooth host. Safe to call at any time; \
        collected state stays readable.",
    responses(
        (status = 200, description = "Tracker stopped", body = TrackerResponse)
    )
)]
pub async fn stop_tracker(State(state): State<SharedState>) -> Json<TrackerResponse> {
    state.tracker.stop();
    Json(TrackerResponse {
        running: state.tracker.is_running(),
    })
}

/// Clear collected state.
#[utoipa::path(
    post,
    path = "/api/tracker/reset",
    tag = "tracker",
    operation_id = "resetTracker",
    summary = "Reset presence state",
    description = "Clears discovered devices and link status and restores the \
        initial adapter state. Does not change whether the tracker is running.",
    responses(
        (status = 200, description = "State after the reset", body = PresenceSnapshot)
    )
)]
pub async fn reset_tracker(State(state): State<SharedState>) -> Json<PresenceSnapshot> {
    state.tracker.reset();
    info!("Presence state reset over HTTP");
    Json(state.tracker.snapshot())
}
