//! OpenAPI specification generation for the LinkUp presence API.
//!
//! The document is served at `/api/openapi.json`, rendered by Swagger UI at
//! `/swagger-ui`, and written to disk by the `gen-openapi` binary for client
//! generation.

use linkup_core::{AdapterState, DiscoveredDevice, PresenceChange, PresenceSnapshot};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::adapter::{AdapterResponse, EnableAdapterResponse};
use super::connections::{ConnectionResponse, ConnectionsResponse};
use super::devices::DevicesResponse;
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::presence::PresenceUpdate;
use super::tracker::TrackerResponse;

/// Path the OpenAPI document is served at.
pub const OPENAPI_PATH: &str = "/api/openapi.json";

/// Swagger UI serving the OpenAPI document.
#[must_use]
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty JSON (for writing to file).
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for LinkUp.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "LinkUp Presence API",
        version = "0.1.0",
        description = r"
# LinkUp Presence API

Observable Bluetooth presence state for LinkUp devices.

## Overview

The server owns one presence tracker which consumes events from the local
Bluetooth host and keeps three pieces of state:

1. **Adapter**: whether the local radio is on, off or not yet reported
2. **Connections**: the latest link status of every device that connected or disconnected
3. **Discovered devices**: every device seen advertising, once per address

Discovery does not imply a link, and a link does not imply discovery.

## Observing changes

Poll `/api/presence`, or subscribe to `/api/presence/stream` to receive a
snapshot on connect and one event per accepted change.
",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local LinkUp server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks"
        ),
        (
            name = "presence",
            description = "Full presence state and its change stream"
        ),
        (
            name = "adapter",
            description = "Local Bluetooth adapter power state"
        ),
        (
            name = "connections",
            description = "Link status of remote devices"
        ),
        (
            name = "devices",
            description = "Remote devices discovered while scanning"
        ),
        (
            name = "tracker",
            description = "Tracker lifecycle: start, stop and reset"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Presence endpoints
        super::presence::get_presence,
        super::presence::stream_presence,
        // Adapter endpoints
        super::adapter::get_adapter,
        super::adapter::enable_adapter,
        // Connection endpoints
        super::connections::get_connections,
        super::connections::get_connection,
        // Device endpoints
        super::devices::get_devices,
        super::devices::get_device,
        // Tracker endpoints
        super::tracker::get_tracker,
        super::tracker::start_tracker,
        super::tracker::stop_tracker,
        super::tracker::reset_tracker,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Presence types
            AdapterState,
            DiscoveredDevice,
            PresenceSnapshot,
            PresenceChange,
            PresenceUpdate,
            // Adapter types
            AdapterResponse,
            EnableAdapterResponse,
            // Connection types
            ConnectionsResponse,
            ConnectionResponse,
            // Device types
            DevicesResponse,
            // Tracker types
            TrackerResponse,
        )
    )
)]
pub struct ApiDoc;
