//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `presence` - Full presence snapshot and its event stream
//! - `adapter` - Adapter power state and enable requests
//! - `connections` - Device link status
//! - `devices` - Discovered devices
//! - `tracker` - Tracker lifecycle
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod adapter;
pub mod connections;
pub mod devices;
pub mod error;
pub mod health;
pub mod openapi;
pub mod presence;
pub mod tracker;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                     - Health check
/// /swagger-ui                 - Interactive API documentation
/// /api
/// ├── /presence               - Full snapshot
/// │   └── /stream             - Server-sent presence updates
/// ├── /adapter                - Adapter state
/// │   └── /enable             - Request adapter enable
/// ├── /connections[/{address}] - Link status
/// ├── /devices[/{address}]    - Discovered devices
/// ├── /tracker                - Lifecycle status
/// │   ├── /start
/// │   ├── /stop
/// │   └── /reset
/// └── /openapi.json           - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/presence", presence::router())
                .nest("/adapter", adapter::router())
                .nest("/connections", connections::router())
                .nest("/devices", devices::router())
                .nest("/tracker", tracker::router()),
        )
        .merge(openapi::swagger_ui())
        .with_state(state)
}

/// The router with request tracing, CORS and response compression applied.
pub fn create_app(state: SharedState) -> Router {
    create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(CompressionLayer::new()),
    )
}
