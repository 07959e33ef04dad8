//! Shared fixtures for handler tests.

use std::sync::Arc;

use axum_test::TestServer;
use linkup_core::{
    LinkupConfig, MockAdapterControl, MockEventSource, PresenceEvent, PresenceTracker,
};

use crate::api;
use crate::state::{AppState, SharedState};

pub const PHONE: &str = "AA:BB:CC:DD:EE:01";
pub const WATCH: &str = "AA:BB:CC:DD:EE:02";

/// A started tracker over mock host seams, wrapped in app state.
pub struct Harness {
    pub state: SharedState,
    pub source: Arc<MockEventSource>,
    pub control: Arc<MockAdapterControl>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_control(MockAdapterControl::accepting())
    }

    pub fn with_control(control: MockAdapterControl) -> Self {
        let source = Arc::new(MockEventSource::new());
        let control = Arc::new(control);
        let tracker = PresenceTracker::new(source.clone(), control.clone());
        tracker.start();
        let state = AppState::new(LinkupConfig::default(), tracker).shared();
        Self {
            state,
            source,
            control,
        }
    }

    /// Adapter on, phone linked then dropped, watch linked, phone discovered.
    pub fn with_scenario(self) -> Self {
        self.source.emit_all([
            PresenceEvent::AdapterStateChanged { enabled: true },
            PresenceEvent::device_found(PHONE, Some("Pixel")),
            PresenceEvent::link(PHONE, true),
            PresenceEvent::link(WATCH, true),
            PresenceEvent::link(PHONE, false),
        ]);
        self
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(api::create_app(self.state.clone())).unwrap()
    }
}
