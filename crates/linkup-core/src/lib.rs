//! # linkup-core
//!
//! Bluetooth presence tracking for LinkUp.
//!
//! This crate provides:
//! - A presence tracker mirroring adapter power, device links and device
//!   discoveries into observable state
//! - Host seams (event source, adapter control, clock) with a BlueZ backend
//! - Configuration management
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`presence`] - The tracker, its lifecycle and its observable views
//! - [`event`] - Raw host events consumed by the tracker
//! - [`source`] - Traits a host implements, and the sink events flow through
//! - `bluetooth` - BlueZ-backed source and adapter control (feature `bluetooth`)
//! - `mock` - In-memory host doubles (feature `mock-bluetooth`)
//! - [`config`] - Layered configuration loading, saving and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod event;
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub mod mock;
pub mod presence;
pub mod source;
pub mod types;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::{BluezAdapterControl, BluezEventSource};
pub use config::{
    is_valid_address, ConfigError, ConfigResult, LinkupConfig, LoggingConfig, ServerConfig,
    TrackerConfig,
};
pub use error::{Error, LinkupError, Result};
pub use event::PresenceEvent;
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use mock::{ManualClock, MockAdapterControl, MockEventSource};
pub use presence::{PresenceTracker, TrackerBuilder};
pub use source::{AdapterControl, Clock, EventSource, PresenceSink, SystemClock};
pub use types::{
    AdapterState, ConnectionMap, DeviceMap, DiscoveredDevice, PresenceChange, PresenceSnapshot,
};
