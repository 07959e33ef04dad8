//! Device presence tracking.
//!
//! [`PresenceTracker`] mirrors host Bluetooth notifications into three
//! observable containers:
//!
//! - the adapter power state,
//! - link status per device address,
//! - a discovery record per device address.
//!
//! Containers are only ever written by [`PresenceTracker::on_event`] and
//! [`PresenceTracker::reset`], one dispatch at a time. Consumers either read
//! cloned views, hold a [`watch::Receiver`] for the latest value of one
//! container, or subscribe to the [`PresenceChange`] delta stream.
//!
//! Lifecycle and host failures never reach the caller: they are logged and the
//! tracker carries on with whatever state it has.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use linkup_core::{AdapterControl, EventSource, PresenceEvent, PresenceSink, PresenceTracker, Result};
//!
//! struct Quiet;
//!
//! impl EventSource for Quiet {
//!     fn register(&self, _sink: PresenceSink) -> Result<()> { Ok(()) }
//!     fn unregister(&self) -> Result<()> { Ok(()) }
//! }
//!
//! impl AdapterControl for Quiet {
//!     fn request_enable(&self, _sink: PresenceSink) -> Result<()> { Ok(()) }
//! }
//!
//! let tracker = PresenceTracker::new(Arc::new(Quiet), Arc::new(Quiet));
//! tracker.on_event(PresenceEvent::link("AA:BB:CC:DD:EE:FF", true));
//!
//! assert_eq!(tracker.is_connected("AA:BB:CC:DD:EE:FF"), Some(true));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::event::PresenceEvent;
use crate::source::{AdapterControl, Clock, EventSource, PresenceSink, SystemClock};
use crate::types::{
    AdapterState, ConnectionMap, DeviceMap, DiscoveredDevice, PresenceChange, PresenceSnapshot,
};

/// Default buffer size of the change stream.
pub const DEFAULT_CHANGE_CAPACITY: usize = 64;

/// Start/stop bookkeeping.
#[derive(Debug, Default)]
struct Lifecycle {
    generation: u64,
    running: bool,
}

/// State shared between tracker handles and the sinks they hand out.
pub(crate) struct Shared {
    source: Arc<dyn EventSource>,
    control: Arc<dyn AdapterControl>,
    clock: Arc<dyn Clock>,
    initial_adapter: AdapterState,
    lifecycle: Mutex<Lifecycle>,
    /// Held across register/unregister so start, stop and source exit never
    /// interleave. Reentrant because a source may call back into the tracker.
    transition: ReentrantMutex<()>,
    dispatch: Mutex<()>,
    adapter: watch::Sender<AdapterState>,
    connections: watch::Sender<ConnectionMap>,
    discovered: watch::Sender<DeviceMap>,
    changes: broadcast::Sender<PresenceChange>,
}

impl Shared {
    /// Whether a sink of `generation` may still deliver. `None` is always open.
    pub(crate) fn accepts(&self, generation: Option<u64>) -> bool {
        generation.map_or(true, |generation| {
            let lifecycle = self.lifecycle.lock();
            lifecycle.running && lifecycle.generation == generation
        })
    }

    /// The source of `generation` stopped delivering on its own.
    pub(crate) fn source_ended(&self, generation: u64) {
        let _transition = self.transition.lock();
        {
            let mut lifecycle = self.lifecycle.lock();
            if !(lifecycle.running && lifecycle.generation == generation) {
                return;
            }
            lifecycle.running = false;
        }
        if let Err(err) = self.source.unregister() {
            debug!(error = %err, "Event source already detached after exit");
        }
        warn!(generation, "Event source ended, presence tracker stopped");
    }

    pub(crate) fn apply(&self, event: PresenceEvent) {
        let _serial = self.dispatch.lock();

        match event {
            PresenceEvent::AdapterStateChanged { enabled } => {
                let state = AdapterState::from(enabled);
                let changed = self.adapter.send_if_modified(|current| {
                    let changed = *current != state;
                    *current = state;
                    changed
                });
                debug!(state = %state, changed, "Adapter state event");
                if changed {
                    self.publish(PresenceChange::AdapterChanged { state });
                }
            }
            PresenceEvent::DeviceFound { address, name } => {
                let seen_at = self.clock.now();
                let mut change = None;
                self.discovered.send_modify(|devices| {
                    let first_sighting = !devices.contains_key(&address);
                    let device = devices
                        .entry(address.clone())
                        .or_insert_with(|| DiscoveredDevice {
                            address: address.clone(),
                            display_name: None,
                            first_seen_at: seen_at,
                        });
                    if name.is_some() {
                        device.display_name = name;
                    }
                    device.first_seen_at = seen_at;
                    change = Some(PresenceChange::DeviceDiscovered {
                        device: device.clone(),
                        first_sighting,
                    });
                });
                debug!(address = %address, "Device found");
                if let Some(change) = change {
                    self.publish(change);
                }
            }
            PresenceEvent::LinkConnected { address } => self.set_connection(address, true),
            PresenceEvent::LinkDisconnected { address } => self.set_connection(address, false),
            PresenceEvent::Unrecognized { name } => {
                debug!(kind = %name, "Ignoring unrecognized host event");
            }
        }
    }

    fn set_connection(&self, address: String, connected: bool) {
        let changed = self.connections.send_if_modified(|connections| {
            if connections.get(&address) == Some(&connected) {
                return false;
            }
            connections.insert(address.clone(), connected);
            true
        });
        debug!(address = %address, connected, changed, "Link state event");
        if changed {
            self.publish(PresenceChange::ConnectionChanged { address, connected });
        }
    }

    fn publish(&self, change: PresenceChange) {
        // No receivers is fine.
        self.changes.send(change).ok();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().running {
            if let Err(err) = self.source.unregister() {
                debug!(error = %err, "Event source already detached at teardown");
            }
        }
        self.control.release();
    }
}

/// Tracks adapter state, device links and discoveries.
///
/// Cloning yields another handle to the same tracker.
#[derive(Clone)]
pub struct PresenceTracker {
    shared: Arc<Shared>,
}

impl PresenceTracker {
    /// Tracker with default settings.
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>, control: Arc<dyn AdapterControl>) -> Self {
        Self::builder(source, control).build()
    }

    /// Start configuring a tracker.
    #[must_use]
    pub fn builder(
        source: Arc<dyn EventSource>,
        control: Arc<dyn AdapterControl>,
    ) -> TrackerBuilder {
        TrackerBuilder {
            source,
            control,
            clock: Arc::new(SystemClock),
            initial_adapter: AdapterState::Unknown,
            change_capacity: DEFAULT_CHANGE_CAPACITY,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Begin consuming the event source. No-op when already started.
    ///
    /// Registration failures are logged and leave the tracker stopped, so a
    /// later call retries.
    pub fn start(&self) {
        let _transition = self.shared.transition.lock();
        let generation = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.running {
                debug!(generation = lifecycle.generation, "Presence tracker already started");
                return;
            }
            lifecycle.generation += 1;
            lifecycle.running = true;
            lifecycle.generation
        };

        // The source may deliver synchronously, so the lifecycle lock is released first.
        let sink = PresenceSink::gated(Arc::downgrade(&self.shared), generation);
        if let Err(err) = self.shared.source.register(sink) {
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.generation == generation {
                lifecycle.running = false;
            }
            warn!(error = %err, "Failed to register with event source");
            return;
        }

        let current = {
            let lifecycle = self.shared.lifecycle.lock();
            lifecycle.running && lifecycle.generation == generation
        };
        if current {
            info!(generation, "Presence tracker started");
            return;
        }

        // Stopped from inside `register`: the new registration has no owner.
        if let Err(err) = self.shared.source.unregister() {
            debug!(error = %err, "Event source already detached");
        }
        debug!(generation, "Presence tracker stopped while starting");
    }

    /// Stop consuming the event source. Safe to call at any time.
    ///
    /// State is kept; a later [`start`](Self::start) resumes into the same
    /// containers.
    pub fn stop(&self) {
        let _transition = self.shared.transition.lock();
        let was_running = std::mem::take(&mut self.shared.lifecycle.lock().running);

        if let Err(err) = self.shared.source.unregister() {
            warn!(error = %err, was_running, "Failed to unregister from event source");
        }
        self.shared.control.release();

        if was_running {
            info!("Presence tracker stopped");
        }
    }

    /// Whether the tracker is currently consuming its source.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lifecycle.lock().running
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Apply one host event. Updates exactly one container.
    pub fn on_event(&self, event: PresenceEvent) {
        self.shared.apply(event);
    }

    /// Ask the host to prompt for enabling the adapter.
    ///
    /// The outcome arrives later as an adapter event, even while the tracker is
    /// stopped. Returns `false` if the request could not be issued.
    pub fn request_adapter_enable(&self) -> bool {
        let sink = PresenceSink::open(Arc::downgrade(&self.shared));
        match self.shared.control.request_enable(sink) {
            Ok(()) => {
                info!(adapter = %self.adapter_state(), "Adapter enable requested");
                true
            }
            Err(err) => {
                warn!(error = %err, "Failed to request adapter enable");
                false
            }
        }
    }

    /// Clear connections and discoveries, and restore the initial adapter state.
    pub fn reset(&self) {
        let _serial = self.shared.dispatch.lock();
        let initial = self.shared.initial_adapter;

        self.shared.adapter.send_if_modified(|state| {
            let changed = *state != initial;
            *state = initial;
            changed
        });
        self.shared.connections.send_if_modified(|connections| {
            let changed = !connections.is_empty();
            connections.clear();
            changed
        });
        self.shared.discovered.send_if_modified(|devices| {
            let changed = !devices.is_empty();
            devices.clear();
            changed
        });

        self.shared.publish(PresenceChange::Reset);
        info!("Presence state reset");
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    /// Current adapter state.
    #[must_use]
    pub fn adapter_state(&self) -> AdapterState {
        *self.shared.adapter.borrow()
    }

    /// Whether the adapter is known to be on.
    #[must_use]
    pub fn adapter_enabled(&self) -> bool {
        self.adapter_state().is_enabled()
    }

    /// Link status of every device that has had a link event.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionMap {
        self.shared.connections.borrow().clone()
    }

    /// Link status of one device, `None` if it never had a link event.
    #[must_use]
    pub fn is_connected(&self, address: &str) -> Option<bool> {
        self.shared.connections.borrow().get(address).copied()
    }

    /// Every discovered device, ordered by address.
    #[must_use]
    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        self.shared.discovered.borrow().values().cloned().collect()
    }

    /// Discovery record of one device.
    #[must_use]
    pub fn discovered_device(&self, address: &str) -> Option<DiscoveredDevice> {
        self.shared.discovered.borrow().get(address).cloned()
    }

    /// Consistent view of all three containers.
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        let _serial = self.shared.dispatch.lock();
        let adapter_state = self.adapter_state();
        PresenceSnapshot {
            adapter_state,
            adapter_enabled: adapter_state.is_enabled(),
            connections: self.connection_status(),
            discovered_devices: self.discovered_devices(),
        }
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    /// Latest adapter state, notified on change.
    #[must_use]
    pub fn watch_adapter(&self) -> watch::Receiver<AdapterState> {
        self.shared.adapter.subscribe()
    }

    /// Latest connection map, notified on change.
    #[must_use]
    pub fn watch_connections(&self) -> watch::Receiver<ConnectionMap> {
        self.shared.connections.subscribe()
    }

    /// Latest discovery map, notified on every sighting.
    #[must_use]
    pub fn watch_discovered(&self) -> watch::Receiver<DeviceMap> {
        self.shared.discovered.subscribe()
    }

    /// Stream of accepted mutations from now on.
    #[must_use]
    pub fn subscribe_changes(&self) -> broadcast::Receiver<PresenceChange> {
        self.shared.changes.subscribe()
    }
}

impl fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("running", &self.is_running())
            .field("adapter", &self.adapter_state())
            .field("connections", &self.shared.connections.borrow().len())
            .field("discovered", &self.shared.discovered.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PresenceTracker`].
#[must_use]
pub struct TrackerBuilder {
    source: Arc<dyn EventSource>,
    control: Arc<dyn AdapterControl>,
    clock: Arc<dyn Clock>,
    initial_adapter: AdapterState,
    change_capacity: usize,
}

impl TrackerBuilder {
    /// Timestamp discoveries with `clock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed the adapter state instead of starting from `unknown`.
    pub fn initial_adapter_state(mut self, enabled: bool) -> Self {
        self.initial_adapter = AdapterState::from(enabled);
        self
    }

    /// Buffer size of the change stream. Slow subscribers lag past this.
    pub fn change_capacity(mut self, capacity: usize) -> Self {
        self.change_capacity = capacity.max(1);
        self
    }

    /// Apply tracker settings from configuration.
    pub fn with_config(self, config: &TrackerConfig) -> Self {
        self.change_capacity(config.change_capacity)
    }

    /// Build the tracker. It starts stopped.
    pub fn build(self) -> PresenceTracker {
        let (adapter, _) = watch::channel(self.initial_adapter);
        let (connections, _) = watch::channel(ConnectionMap::new());
        let (discovered, _) = watch::channel(DeviceMap::new());
        let (changes, _) = broadcast::channel(self.change_capacity);

        PresenceTracker {
            shared: Arc::new(Shared {
                source: self.source,
                control: self.control,
                clock: self.clock,
                initial_adapter: self.initial_adapter,
                lifecycle: Mutex::new(Lifecycle::default()),
                transition: ReentrantMutex::new(()),
                dispatch: Mutex::new(()),
                adapter,
                connections,
                discovered,
                changes,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LinkupError, Result};
    use crate::mock::{ManualClock, MockAdapterControl, MockEventSource};
    use chrono::Duration;

    struct Fixture {
        tracker: PresenceTracker,
        source: Arc<MockEventSource>,
        control: Arc<MockAdapterControl>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(control: MockAdapterControl) -> Fixture {
        let source = Arc::new(MockEventSource::new());
        let control = Arc::new(control);
        let clock = Arc::new(ManualClock::default());
        let tracker = PresenceTracker::builder(source.clone(), control.clone())
            .clock(clock.clone())
            .build();
        Fixture {
            tracker,
            source,
            control,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockAdapterControl::new())
    }

    struct RefusingSource;

    impl EventSource for RefusingSource {
        fn register(&self, _sink: PresenceSink) -> Result<()> {
            Err(LinkupError::AdapterNotFound)
        }

        fn unregister(&self) -> Result<()> {
            Err(LinkupError::NotRegistered)
        }
    }

    #[test]
    fn test_scenario_final_state() {
        let f = fixture();
        f.tracker.start();

        let accepted = f.source.emit_all([
            PresenceEvent::AdapterStateChanged { enabled: true },
            PresenceEvent::device_found("AA:BB", Some("Phone1")),
            PresenceEvent::link("AA:BB", true),
            PresenceEvent::AdapterStateChanged { enabled: false },
        ]);
        assert_eq!(accepted, 4);

        let snapshot = f.tracker.snapshot();
        assert!(!snapshot.adapter_enabled);
        assert_eq!(snapshot.adapter_state, AdapterState::Off);
        assert_eq!(snapshot.connections.len(), 1);
        assert_eq!(snapshot.connections.get("AA:BB"), Some(&true));
        assert_eq!(snapshot.discovered_devices.len(), 1);
        assert_eq!(snapshot.discovered_devices[0].address, "AA:BB");
        assert_eq!(
            snapshot.discovered_devices[0].display_name.as_deref(),
            Some("Phone1")
        );
    }

    #[test]
    fn test_starts_unknown_and_empty() {
        let f = fixture();
        assert_eq!(f.tracker.adapter_state(), AdapterState::Unknown);
        assert!(!f.tracker.adapter_enabled());
        assert!(f.tracker.connection_status().is_empty());
        assert!(f.tracker.discovered_devices().is_empty());
        assert!(!f.tracker.is_running());
    }

    #[test]
    fn test_initial_adapter_state_is_seeded() {
        let tracker = PresenceTracker::builder(
            Arc::new(MockEventSource::new()),
            Arc::new(MockAdapterControl::new()),
        )
        .initial_adapter_state(true)
        .build();
        assert!(tracker.adapter_enabled());
    }

    #[test]
    fn test_rediscovery_keeps_single_entry_with_latest_timestamp() {
        let f = fixture();
        for _ in 0..5 {
            f.clock.advance(Duration::seconds(30));
            f.tracker
                .on_event(PresenceEvent::device_found("AA:BB", Some("Phone1")));
        }

        let devices = f.tracker.discovered_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].first_seen_at, f.clock.now());
    }

    #[test]
    fn test_rediscovery_without_name_keeps_known_name() {
        let f = fixture();
        f.tracker
            .on_event(PresenceEvent::device_found("AA:BB", Some("Phone1")));
        f.tracker.on_event(PresenceEvent::device_found("AA:BB", None));

        let device = f.tracker.discovered_device("AA:BB").unwrap();
        assert_eq!(device.display_name.as_deref(), Some("Phone1"));

        f.tracker
            .on_event(PresenceEvent::device_found("AA:BB", Some("Renamed")));
        let device = f.tracker.discovered_device("AA:BB").unwrap();
        assert_eq!(device.display_name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_connection_follows_most_recent_event() {
        let f = fixture();

        f.tracker.on_event(PresenceEvent::link("AA:BB", true));
        f.tracker.on_event(PresenceEvent::link("AA:BB", false));
        assert_eq!(f.tracker.is_connected("AA:BB"), Some(false));

        f.tracker.on_event(PresenceEvent::link("CC:DD", false));
        f.tracker.on_event(PresenceEvent::link("CC:DD", true));
        assert_eq!(f.tracker.is_connected("CC:DD"), Some(true));

        f.tracker.on_event(PresenceEvent::link("CC:DD", true));
        assert_eq!(f.tracker.is_connected("CC:DD"), Some(true));
        assert_eq!(f.tracker.is_connected("EE:FF"), None);
    }

    #[test]
    fn test_events_touch_only_their_container() {
        let f = fixture();
        f.tracker.on_event(PresenceEvent::link("AA:BB", true));

        assert!(f.tracker.discovered_devices().is_empty());
        assert_eq!(f.tracker.adapter_state(), AdapterState::Unknown);

        f.tracker
            .on_event(PresenceEvent::device_found("CC:DD", None));
        assert_eq!(f.tracker.is_connected("CC:DD"), None);
    }

    #[test]
    fn test_unrecognized_event_is_ignored() {
        let f = fixture();
        let before = f.tracker.snapshot();
        let mut changes = f.tracker.subscribe_changes();

        f.tracker.on_event(PresenceEvent::Unrecognized {
            name: "connection_state_changed".to_string(),
        });

        assert_eq!(f.tracker.snapshot(), before);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_stop_twice_is_harmless() {
        let f = fixture();
        f.tracker.start();
        f.source.emit(PresenceEvent::link("AA:BB", true));
        let before = f.tracker.snapshot();

        f.tracker.stop();
        f.tracker.stop();

        assert!(!f.tracker.is_running());
        assert!(!f.source.is_registered());
        assert_eq!(f.tracker.snapshot(), before);
        assert_eq!(f.control.releases(), 2);
    }

    #[test]
    fn test_stop_without_start_is_harmless() {
        let f = fixture();
        f.tracker.stop();
        assert!(!f.tracker.is_running());
        assert_eq!(f.source.registrations(), 0);
    }

    #[test]
    fn test_start_is_idempotent() {
        let f = fixture();
        f.tracker.start();
        f.tracker.start();
        assert!(f.tracker.is_running());
        assert_eq!(f.source.registrations(), 1);
    }

    #[test]
    fn test_restart_resumes_into_same_state() {
        let f = fixture();
        f.tracker.start();
        f.source
            .emit(PresenceEvent::device_found("AA:BB", Some("Phone1")));
        f.tracker.stop();

        assert!(!f.source.emit(PresenceEvent::link("AA:BB", true)));

        f.tracker.start();
        assert!(f.source.emit(PresenceEvent::link("AA:BB", true)));

        assert_eq!(f.source.registrations(), 2);
        assert_eq!(f.tracker.discovered_devices().len(), 1);
        assert_eq!(f.tracker.is_connected("AA:BB"), Some(true));
    }

    #[test]
    fn test_stale_sink_is_closed() {
        let f = fixture();
        f.tracker.start();
        let sink = f.source.current_sink().unwrap();
        assert!(!sink.is_closed());

        f.tracker.stop();
        assert!(sink.is_closed());
        assert!(!sink.deliver(PresenceEvent::link("AA:BB", true)));
        assert_eq!(f.tracker.is_connected("AA:BB"), None);

        // A restart hands out a new sink; the old one stays closed.
        f.tracker.start();
        assert!(sink.is_closed());
    }

    #[test]
    fn test_sink_closes_when_tracker_is_dropped() {
        let f = fixture();
        f.tracker.start();
        let sink = f.source.current_sink().unwrap();

        let Fixture {
            tracker,
            source,
            control,
            ..
        } = f;
        drop(tracker);

        assert!(sink.is_closed());
        assert!(!source.is_registered());
        assert_eq!(control.releases(), 1);
    }

    #[test]
    fn test_failed_registration_leaves_tracker_stopped() {
        let tracker = PresenceTracker::new(
            Arc::new(RefusingSource),
            Arc::new(MockAdapterControl::new()),
        );
        tracker.start();
        assert!(!tracker.is_running());

        // Unregister errors are swallowed as well.
        tracker.stop();
        assert!(!tracker.is_running());
    }

    /// Stops the tracker from inside its first `register` call.
    #[derive(Default)]
    struct StopOnRegister {
        inner: MockEventSource,
        tracker: Mutex<Option<PresenceTracker>>,
    }

    impl EventSource for StopOnRegister {
        fn register(&self, sink: PresenceSink) -> Result<()> {
            let tracker = self.tracker.lock().take();
            if let Some(tracker) = tracker {
                tracker.stop();
            }
            self.inner.register(sink)
        }

        fn unregister(&self) -> Result<()> {
            self.inner.unregister()
        }
    }

    #[test]
    fn test_stop_during_registration_withdraws_it() {
        let source = Arc::new(StopOnRegister::default());
        let tracker = PresenceTracker::new(source.clone(), Arc::new(MockAdapterControl::new()));
        *source.tracker.lock() = Some(tracker.clone());

        tracker.start();
        assert!(!tracker.is_running());
        assert!(!source.inner.is_registered());

        tracker.start();
        assert!(tracker.is_running());
        assert!(source.inner.is_registered());
        assert_eq!(source.inner.registrations(), 2);
    }

    #[test]
    fn test_concurrent_start_stop_never_strands_registration() {
        let f = fixture();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let tracker = f.tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        tracker.start();
                        tracker.stop();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        f.tracker.stop();
        assert!(!f.source.is_registered());

        f.tracker.start();
        assert!(f.tracker.is_running());
        assert!(f.source.is_registered());
        assert!(f.source.emit(PresenceEvent::link("AA:BB", true)));
    }

    #[test]
    fn test_source_ending_stops_tracker() {
        let f = fixture();
        f.tracker.start();
        let sink = f.source.current_sink().unwrap();

        sink.source_ended();
        assert!(!f.tracker.is_running());
        assert!(!f.source.is_registered());
        assert!(sink.is_closed());

        f.tracker.start();
        assert!(f.tracker.is_running());
        assert_eq!(f.source.registrations(), 2);
    }

    #[test]
    fn test_stale_source_ending_is_ignored() {
        let f = fixture();
        f.tracker.start();
        let stale = f.source.current_sink().unwrap();
        f.tracker.stop();
        f.tracker.start();

        stale.source_ended();
        assert!(f.tracker.is_running());
        assert!(f.source.is_registered());
    }

    #[test]
    fn test_enable_request_forwarded_when_already_enabled() {
        let f = fixture();
        f.tracker
            .on_event(PresenceEvent::AdapterStateChanged { enabled: true });
        let before = f.tracker.snapshot();

        assert!(f.tracker.request_adapter_enable());

        assert_eq!(f.control.requests(), 1);
        assert_eq!(f.tracker.snapshot(), before);
    }

    #[test]
    fn test_enable_request_failure_is_swallowed() {
        let f = fixture();
        f.control.fail_with("no activity to launch prompt");

        assert!(!f.tracker.request_adapter_enable());
        assert_eq!(f.control.requests(), 1);
        assert_eq!(f.tracker.adapter_state(), AdapterState::Unknown);
    }

    #[test]
    fn test_accepted_enable_loops_back_while_stopped() {
        let f = fixture_with(MockAdapterControl::accepting());
        f.tracker
            .on_event(PresenceEvent::AdapterStateChanged { enabled: false });

        assert!(f.tracker.request_adapter_enable());
        assert!(f.tracker.adapter_enabled());
    }

    #[test]
    fn test_declined_enable_leaves_state() {
        let f = fixture();
        f.tracker
            .on_event(PresenceEvent::AdapterStateChanged { enabled: false });

        assert!(f.tracker.request_adapter_enable());
        assert_eq!(f.tracker.adapter_state(), AdapterState::Off);
    }

    #[test]
    fn test_reset_clears_state() {
        let f = fixture();
        f.tracker.start();
        f.source.emit_all([
            PresenceEvent::AdapterStateChanged { enabled: true },
            PresenceEvent::device_found("AA:BB", Some("Phone1")),
            PresenceEvent::link("AA:BB", true),
        ]);

        f.tracker.reset();

        assert_eq!(f.tracker.adapter_state(), AdapterState::Unknown);
        assert!(f.tracker.connection_status().is_empty());
        assert!(f.tracker.discovered_devices().is_empty());
        assert!(f.tracker.is_running());
    }

    #[test]
    fn test_identical_connection_event_does_not_notify() {
        let f = fixture();
        let mut rx = f.tracker.watch_connections();

        f.tracker.on_event(PresenceEvent::link("AA:BB", true));
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        f.tracker.on_event(PresenceEvent::link("AA:BB", true));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_rediscovery_always_notifies() {
        let f = fixture();
        let mut rx = f.tracker.watch_discovered();

        f.tracker.on_event(PresenceEvent::device_found("AA:BB", None));
        let _ = rx.borrow_and_update();
        f.clock.advance(Duration::seconds(1));
        f.tracker.on_event(PresenceEvent::device_found("AA:BB", None));

        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_change_stream_reports_mutations_in_order() {
        let f = fixture();
        let mut changes = f.tracker.subscribe_changes();

        f.tracker
            .on_event(PresenceEvent::AdapterStateChanged { enabled: true });
        f.tracker
            .on_event(PresenceEvent::device_found("AA:BB", Some("Phone1")));
        f.tracker
            .on_event(PresenceEvent::device_found("AA:BB", Some("Phone1")));
        f.tracker.on_event(PresenceEvent::link("AA:BB", true));
        f.tracker.on_event(PresenceEvent::link("AA:BB", true));

        assert_eq!(
            changes.try_recv().unwrap(),
            PresenceChange::AdapterChanged {
                state: AdapterState::On
            }
        );
        assert!(matches!(
            changes.try_recv().unwrap(),
            PresenceChange::DeviceDiscovered {
                first_sighting: true,
                ..
            }
        ));
        assert!(matches!(
            changes.try_recv().unwrap(),
            PresenceChange::DeviceDiscovered {
                first_sighting: false,
                ..
            }
        ));
        assert_eq!(
            changes.try_recv().unwrap(),
            PresenceChange::ConnectionChanged {
                address: "AA:BB".to_string(),
                connected: true
            }
        );
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_receiver_sees_latest_value() {
        let f = fixture();
        let mut rx = f.tracker.watch_adapter();

        let tracker = f.tracker.clone();
        let handle = tokio::spawn(async move {
            tracker.on_event(PresenceEvent::AdapterStateChanged { enabled: true });
            tracker.on_event(PresenceEvent::AdapterStateChanged { enabled: false });
        });

        handle.await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), AdapterState::Off);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_is_serialized() {
        let f = fixture();
        let mut handles = Vec::new();
        for i in 0..16 {
            let tracker = f.tracker.clone();
            handles.push(tokio::spawn(async move {
                let address = format!("00:00:00:00:00:{i:02X}");
                tracker.on_event(PresenceEvent::device_found(address.clone(), None));
                tracker.on_event(PresenceEvent::link(address, true));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(f.tracker.discovered_devices().len(), 16);
        assert_eq!(f.tracker.connection_status().len(), 16);
        assert!(f.tracker.connection_status().values().all(|c| *c));
    }
}
