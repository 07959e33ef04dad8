//! Shared types and OpenAPI schemas.
//!
//! These are the read-only projections the presence tracker hands to its
//! consumers. The HTTP host serializes them directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Connection status keyed by device address.
pub type ConnectionMap = BTreeMap<String, bool>;

/// Discovery records keyed by device address.
pub type DeviceMap = BTreeMap<String, DiscoveredDevice>;

/// Power state of the local Bluetooth adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AdapterState {
    /// No adapter event has been observed yet.
    #[default]
    Unknown,
    /// The adapter is powered on.
    On,
    /// The adapter is powered off.
    Off,
}

impl AdapterState {
    /// Whether the adapter is known to be powered on.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::On)
    }

    /// Stable lowercase name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl From<bool> for AdapterState {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote device that advertised its presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "display_name": "Pixel 8",
    "first_seen_at": "2025-01-15T03:30:00Z"
}))]
pub struct DiscoveredDevice {
    /// Bluetooth hardware address.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Advertised device name, if any.
    #[schema(example = "Pixel 8")]
    pub display_name: Option<String>,

    /// Time of the most recent sighting.
    pub first_seen_at: DateTime<Utc>,
}

/// Full observable presence state at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "adapter_state": "on",
    "adapter_enabled": true,
    "connections": { "AA:BB:CC:DD:EE:FF": true },
    "discovered_devices": [{
        "address": "AA:BB:CC:DD:EE:FF",
        "display_name": "Pixel 8",
        "first_seen_at": "2025-01-15T03:30:00Z"
    }]
}))]
pub struct PresenceSnapshot {
    /// Adapter power state.
    pub adapter_state: AdapterState,

    /// `true` only when the adapter is known to be on.
    pub adapter_enabled: bool,

    /// Link status per device address.
    pub connections: ConnectionMap,

    /// Every device discovered since the last reset.
    pub discovered_devices: Vec<DiscoveredDevice>,
}

/// A single accepted mutation of the tracker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresenceChange {
    /// The adapter power state changed.
    AdapterChanged {
        /// New adapter state.
        state: AdapterState,
    },
    /// A device link came up or went down.
    ConnectionChanged {
        /// Device address.
        address: String,
        /// New link status.
        connected: bool,
    },
    /// A device was discovered or seen again.
    DeviceDiscovered {
        /// The stored discovery record after the update.
        device: DiscoveredDevice,
        /// `true` when no record existed for this address before.
        first_sighting: bool,
    },
    /// All state was cleared.
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_state_from_bool() {
        assert_eq!(AdapterState::from(true), AdapterState::On);
        assert_eq!(AdapterState::from(false), AdapterState::Off);
        assert!(!AdapterState::Unknown.is_enabled());
        assert!(AdapterState::On.is_enabled());
    }

    #[test]
    fn test_adapter_state_serialization() {
        let json = serde_json::to_string(&AdapterState::Unknown).unwrap();
        assert_eq!(json, "\"unknown\"");
        assert_eq!(AdapterState::Off.to_string(), "off");
    }

    #[test]
    fn test_change_is_tagged() {
        let change = PresenceChange::ConnectionChanged {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            connected: true,
        };
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"kind\":\"connection_changed\""));
        assert!(json.contains("\"connected\":true"));
    }
}
