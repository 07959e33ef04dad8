//! Presence API endpoints.
//!
//! Exposes the tracker's full observable state, both as a one-off snapshot
//! and as a server-sent event stream.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use linkup_core::{PresenceChange, PresenceSnapshot, PresenceTracker};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::debug;
use utoipa::ToSchema;

use crate::state::SharedState;

/// Creates the presence router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_presence))
        .route("/stream", get(stream_presence))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// One message of the presence stream.
///
/// The first message after connecting carries no change. When the subscriber
/// falls behind, a message without a change carries a fresh snapshot instead
/// of the skipped changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "change": { "kind": "connection_changed", "address": "AA:BB:CC:DD:EE:FF", "connected": true },
    "snapshot": {
        "adapter_state": "on",
        "adapter_enabled": true,
        "connections": { "AA:BB:CC:DD:EE:FF": true },
        "discovered_devices": []
    }
}))]
pub struct PresenceUpdate {
    /// The mutation that triggered this message.
    #[schema(nullable)]
    pub change: Option<PresenceChange>,

    /// Tracker state after the change.
    pub snapshot: PresenceSnapshot,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the full presence state.
#[utoipa::path(
    get,
    path = "/api/presence",
    tag = "presence",
    operation_id = "getPresence",
    summary = "Get adapter, link and discovery state",
    description = "Returns a consistent snapshot of the adapter state, the link \
        status of every device that has connected or disconnected, and every \
        device discovered since the last reset.",
    responses(
        (status = 200, description = "Current presence state", body = PresenceSnapshot)
    )
)]
pub async fn get_presence(State(state): State<SharedState>) -> Json<PresenceSnapshot> {
    Json(state.tracker.snapshot())
}

/// Stream presence updates as server-sent events.
#[utoipa::path(
    get,
    path = "/api/presence/stream",
    tag = "presence",
    operation_id = "streamPresence",
    summary = "Subscribe to presence updates",
    description = "Server-sent event stream of `presence` events. The first event \
        carries the current snapshot; every accepted state change then produces \
        one event with the change and the resulting snapshot. The stream ends \
        when the server shuts down.",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = PresenceUpdate)
    )
)]
pub async fn stream_presence(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let updates = presence_updates(state.tracker.clone(), state.shutdown_signal())
        .map(|update| Event::default().event("presence").json_data(update));

    Sse::new(updates).keep_alive(KeepAlive::default())
}

/// Current snapshot followed by one update per change until `shutdown` flips.
pub fn presence_updates(
    tracker: PresenceTracker,
    shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = PresenceUpdate> {
    // Subscribe before the snapshot so no change falls in between.
    let changes = tracker.subscribe_changes();
    let initial = PresenceUpdate {
        change: None,
        snapshot: tracker.snapshot(),
    };

    let updates = stream::unfold(
        (tracker, changes, shutdown),
        |(tracker, mut changes, mut shutdown)| async move {
            let received = tokio::select! {
                () = closing(&mut shutdown) => return None,
                received = changes.recv() => received,
            };

            let change = match received {
                Ok(change) => Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Presence subscriber lagged, sending fresh snapshot");
                    None
                }
                Err(RecvError::Closed) => return None,
            };
            let update = PresenceUpdate {
                change,
                snapshot: tracker.snapshot(),
            };
            Some((update, (tracker, changes, shutdown)))
        },
    );

    stream::once(async move { initial }).chain(updates)
}

async fn closing(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender ends the stream as well.
    let _ = shutdown.wait_for(|closing| *closing).await;
}
