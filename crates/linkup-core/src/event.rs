//! Raw platform events consumed by the presence tracker.

use serde::{Deserialize, Serialize};

/// One event delivered by the Bluetooth host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// The adapter was powered on or off.
    AdapterStateChanged {
        /// New power state.
        enabled: bool,
    },
    /// A remote device advertised its presence.
    DeviceFound {
        /// Device address.
        address: String,
        /// Advertised name, if the host knows one.
        name: Option<String>,
    },
    /// A link to a remote device was established.
    LinkConnected {
        /// Device address.
        address: String,
    },
    /// A link to a remote device was torn down.
    LinkDisconnected {
        /// Device address.
        address: String,
    },
    /// Any other host notification. Ignored by the tracker.
    Unrecognized {
        /// Host-specific name of the notification.
        name: String,
    },
}

impl PresenceEvent {
    /// Short name used in log fields.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::AdapterStateChanged { .. } => "adapter_state_changed",
            Self::DeviceFound { .. } => "device_found",
            Self::LinkConnected { .. } => "link_connected",
            Self::LinkDisconnected { .. } => "link_disconnected",
            Self::Unrecognized { name } => name.as_str(),
        }
    }

    /// Device address carried by the event, if any.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::DeviceFound { address, .. }
            | Self::LinkConnected { address }
            | Self::LinkDisconnected { address } => Some(address),
            Self::AdapterStateChanged { .. } | Self::Unrecognized { .. } => None,
        }
    }

    /// Convenience constructor for [`PresenceEvent::DeviceFound`].
    pub fn device_found(address: impl Into<String>, name: Option<&str>) -> Self {
        Self::DeviceFound {
            address: address.into(),
            name: name.map(str::to_string),
        }
    }

    /// Link event for `address`: connected when `connected` is true.
    pub fn link(address: impl Into<String>, connected: bool) -> Self {
        let address = address.into();
        if connected {
            Self::LinkConnected { address }
        } else {
            Self::LinkDisconnected { address }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_link_constructor() {
        assert_eq!(
            PresenceEvent::link("AA:BB", true),
            PresenceEvent::LinkConnected {
                address: "AA:BB".to_string()
            }
        );
        assert_eq!(
            PresenceEvent::link("AA:BB", false),
            PresenceEvent::LinkDisconnected {
                address: "AA:BB".to_string()
            }
        );
    }

    #[test]
    fn test_address_and_kind() {
        let event = PresenceEvent::device_found("AA:BB", Some("Phone1"));
        assert_eq!(event.address(), Some("AA:BB"));
        assert_eq!(event.kind(), "device_found");

        let event = PresenceEvent::Unrecognized {
            name: "connection_state_changed".to_string(),
        };
        assert_eq!(event.address(), None);
        assert_eq!(event.kind(), "connection_state_changed");
    }

    #[test]
    fn test_wire_shape_is_tagged_by_kind() {
        let cases = [
            (
                PresenceEvent::AdapterStateChanged { enabled: true },
                json!({ "kind": "adapter_state_changed", "enabled": true }),
            ),
            (
                PresenceEvent::device_found("AA:BB:CC:DD:EE:FF", Some("Pixel")),
                json!({ "kind": "device_found", "address": "AA:BB:CC:DD:EE:FF", "name": "Pixel" }),
            ),
            (
                PresenceEvent::device_found("AA:BB:CC:DD:EE:FF", None),
                json!({ "kind": "device_found", "address": "AA:BB:CC:DD:EE:FF", "name": null }),
            ),
            (
                PresenceEvent::link("AA:BB:CC:DD:EE:FF", true),
                json!({ "kind": "link_connected", "address": "AA:BB:CC:DD:EE:FF" }),
            ),
            (
                PresenceEvent::link("AA:BB:CC:DD:EE:FF", false),
                json!({ "kind": "link_disconnected", "address": "AA:BB:CC:DD:EE:FF" }),
            ),
            (
                PresenceEvent::Unrecognized {
                    name: "bond_state_changed".to_string(),
                },
                json!({ "kind": "unrecognized", "name": "bond_state_changed" }),
            ),
        ];

        for (event, wire) in cases {
            assert_eq!(serde_json::to_value(&event).unwrap(), wire);
            let parsed: PresenceEvent = serde_json::from_value(wire).unwrap();
            assert_eq!(parsed, event);
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let parsed = serde_json::from_value::<PresenceEvent>(json!({ "kind": "teleported" }));
        assert!(parsed.is_err());
    }
}
