//! BlueZ-backed event source and adapter control.
//!
//! [`BluezEventSource`] follows a BlueZ adapter while it is registered and
//! translates D-Bus notifications into [`PresenceEvent`]s:
//!
//! | BlueZ notification                  | event                         |
//! |-------------------------------------|-------------------------------|
//! | adapter `Powered` changed           | `AdapterStateChanged`         |
//! | device reported by discovery        | `DeviceFound` if it has an RSSI |
//! | device `RSSI` changed               | `DeviceFound` (new sighting)  |
//! | device `Connected` changed          | `LinkConnected` / `LinkDisconnected` |
//! | other adapter or device property    | `Unrecognized`                |
//!
//! Adapter properties are watched for the whole registration. Discovery only
//! runs while the adapter is powered: it pauses on power-off, resumes on
//! power-on, and is retried every [`DISCOVERY_RETRY`] if BlueZ refuses or ends
//! it. Unregistering drops the discovery session and ends the scan.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, Device, DeviceEvent, DeviceProperty};
use futures::stream::{self, AbortHandle, SelectAll, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::error::{LinkupError, Result};
use crate::event::PresenceEvent;
use crate::source::{AdapterControl, EventSource, PresenceSink};

/// How often a powered adapter without a discovery session retries one.
pub const DISCOVERY_RETRY: Duration = Duration::from_secs(5);

type AdapterEvents = Pin<Box<dyn Stream<Item = AdapterEvent> + Send>>;
type DeviceEvents = Pin<Box<dyn Stream<Item = (Address, DeviceEvent)> + Send>>;

async fn open_adapter(name: Option<&str>) -> Result<Adapter> {
    let session = bluer::Session::new().await?;
    let adapter = match name {
        Some(name) => session.adapter(name)?,
        None => session.default_adapter().await?,
    };
    Ok(adapter)
}

// =============================================================================
// TRANSLATION
// =============================================================================

/// A BlueZ notification, tagged by the stream it came from.
enum Notification {
    /// Adapter property or device list change.
    Adapter(AdapterEvent),
    /// Output of the running discovery session.
    Discovery(AdapterEvent),
    /// Property change of a watched device.
    Device(Address, DeviceEvent),
}

/// What the pump does in response to a notification.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Deliver(PresenceEvent),
    /// Watch the device and report it if it is in range.
    Inspect(Address),
    /// Watch the device without reporting it.
    Watch(Address),
    Forget(Address),
    StartDiscovery,
    StopDiscovery,
}

/// Pure mapping from BlueZ notifications to pump steps.
#[derive(Debug, Default)]
struct Translator {
    powered: bool,
}

impl Translator {
    fn power(&mut self, enabled: bool) -> Vec<Step> {
        let was_powered = std::mem::replace(&mut self.powered, enabled);
        let mut steps = vec![Step::Deliver(PresenceEvent::AdapterStateChanged { enabled })];
        match (was_powered, enabled) {
            (false, true) => steps.push(Step::StartDiscovery),
            (true, false) => steps.push(Step::StopDiscovery),
            _ => {}
        }
        steps
    }

    fn retry(&self, discovering: bool) -> Vec<Step> {
        if self.powered && !discovering {
            vec![Step::StartDiscovery]
        } else {
            Vec::new()
        }
    }

    fn translate(&mut self, notification: Notification) -> Vec<Step> {
        match notification {
            Notification::Adapter(event) => match event {
                AdapterEvent::PropertyChanged(AdapterProperty::Powered(enabled)) => {
                    self.power(enabled)
                }
                AdapterEvent::PropertyChanged(_) => vec![unrecognized("adapter_property_changed")],
                AdapterEvent::DeviceAdded(address) => vec![Step::Watch(address)],
                AdapterEvent::DeviceRemoved(address) => vec![Step::Forget(address)],
                #[allow(unreachable_patterns)]
                _ => vec![unrecognized("adapter_event")],
            },
            // Property changes also arrive on the adapter stream.
            Notification::Discovery(AdapterEvent::DeviceAdded(address)) => {
                vec![Step::Inspect(address)]
            }
            Notification::Discovery(_) => Vec::new(),
            Notification::Device(address, event) => match event {
                DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) => vec![
                    Step::Deliver(PresenceEvent::link(address.to_string(), connected)),
                ],
                DeviceEvent::PropertyChanged(DeviceProperty::Rssi(_)) => {
                    vec![Step::Inspect(address)]
                }
                DeviceEvent::PropertyChanged(_) => vec![unrecognized("device_property_changed")],
                #[allow(unreachable_patterns)]
                _ => vec![unrecognized("device_event")],
            },
        }
    }
}

fn unrecognized(name: &str) -> Step {
    Step::Deliver(PresenceEvent::Unrecognized {
        name: name.to_string(),
    })
}

// =============================================================================
// EVENT SOURCE
// =============================================================================

struct Registration {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Event source fed by a BlueZ adapter.
pub struct BluezEventSource {
    adapter_name: Option<String>,
    registration: Mutex<Option<Registration>>,
}

impl BluezEventSource {
    /// Source for the named adapter, or the default adapter when `None`.
    #[must_use]
    pub fn new(adapter_name: Option<String>) -> Self {
        Self {
            adapter_name,
            registration: Mutex::new(None),
        }
    }
}

impl EventSource for BluezEventSource {
    fn register(&self, sink: PresenceSink) -> Result<()> {
        let mut slot = self.registration.lock();
        if slot
            .as_ref()
            .is_some_and(|registration| !registration.handle.is_finished())
        {
            return Err(LinkupError::AlreadyRegistered);
        }
        let runtime = Handle::try_current().map_err(|_| LinkupError::RuntimeUnavailable)?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let adapter_name = self.adapter_name.clone();
        let handle = runtime.spawn(async move {
            let ended = sink.clone();
            tokio::select! {
                result = pump(adapter_name, sink) => {
                    if let Err(err) = result {
                        warn!(error = %err, "Bluetooth event pump failed");
                    }
                    ended.source_ended();
                }
                _ = shutdown_rx => debug!("Bluetooth event pump stopped"),
            }
        });

        *slot = Some(Registration { shutdown, handle });
        Ok(())
    }

    fn unregister(&self) -> Result<()> {
        let registration = self
            .registration
            .lock()
            .take()
            .ok_or(LinkupError::NotRegistered)?;
        // The pump may already have exited on its own.
        registration.shutdown.send(()).ok();
        Ok(())
    }
}

/// Per-device property streams, removable one address at a time.
struct DeviceWatch {
    handles: HashMap<Address, AbortHandle>,
    streams: SelectAll<DeviceEvents>,
}

impl DeviceWatch {
    fn new() -> Self {
        Self {
            handles: HashMap::new(),
            streams: SelectAll::new(),
        }
    }

    async fn watch(&mut self, device: &Device) {
        let address = device.address();
        if self.handles.contains_key(&address) {
            return;
        }
        match device.events().await {
            Ok(events) => {
                let (events, handle) = stream::abortable(events);
                self.handles.insert(address, handle);
                self.streams
                    .push(Box::pin(events.map(move |event| (address, event))));
            }
            Err(err) => debug!(address = %address, error = %err, "No property stream for device"),
        }
    }

    fn forget(&mut self, address: Address) {
        if let Some(handle) = self.handles.remove(&address) {
            handle.abort();
        }
    }
}

enum Wake {
    Adapter(Option<AdapterEvent>),
    Discovery(Option<AdapterEvent>),
    Device(Address, DeviceEvent),
    Retry,
}

async fn next_discovered(discovery: &mut Option<AdapterEvents>) -> Option<AdapterEvent> {
    match discovery {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

async fn start_discovery(adapter: &Adapter) -> Option<AdapterEvents> {
    match adapter.discover_devices().await {
        Ok(events) => {
            info!(adapter = adapter.name(), "Bluetooth discovery started");
            Some(Box::pin(events))
        }
        Err(err) => {
            warn!(adapter = adapter.name(), error = %err, "Bluetooth discovery refused");
            None
        }
    }
}

async fn watch_device(adapter: &Adapter, devices: &mut DeviceWatch, address: Address) -> Option<Device> {
    match adapter.device(address) {
        Ok(device) => {
            devices.watch(&device).await;
            Some(device)
        }
        Err(err) => {
            debug!(address = %address, error = %err, "Device lookup failed");
            None
        }
    }
}

/// Report a device as found only while it is advertising.
async fn inspect(adapter: &Adapter, devices: &mut DeviceWatch, sink: &PresenceSink, address: Address) {
    let Some(device) = watch_device(adapter, devices, address).await else {
        return;
    };
    match device.rssi().await {
        Ok(Some(_)) => {
            let name = device.name().await.unwrap_or_default();
            sink.deliver(PresenceEvent::DeviceFound {
                address: address.to_string(),
                name,
            });
        }
        Ok(None) => trace!(address = %address, "Cached device not in range"),
        Err(err) => debug!(address = %address, error = %err, "Signal strength unavailable"),
    }
}

async fn pump(adapter_name: Option<String>, sink: PresenceSink) -> Result<()> {
    let adapter = open_adapter(adapter_name.as_deref()).await?;
    let mut adapter_events: AdapterEvents = Box::pin(adapter.events().await?);

    let mut devices = DeviceWatch::new();
    for address in adapter.device_addresses().await? {
        watch_device(&adapter, &mut devices, address).await;
    }

    let mut translator = Translator::default();
    let mut discovery: Option<AdapterEvents> = None;
    let mut retry = tokio::time::interval(DISCOVERY_RETRY);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut steps = translator.power(adapter.is_powered().await?);
    loop {
        for step in steps {
            match step {
                Step::Deliver(event) => {
                    sink.deliver(event);
                }
                Step::Inspect(address) => inspect(&adapter, &mut devices, &sink, address).await,
                Step::Watch(address) => {
                    watch_device(&adapter, &mut devices, address).await;
                }
                Step::Forget(address) => devices.forget(address),
                Step::StartDiscovery => {
                    if discovery.is_none() {
                        discovery = start_discovery(&adapter).await;
                    }
                }
                Step::StopDiscovery => {
                    if discovery.take().is_some() {
                        info!(adapter = adapter.name(), "Bluetooth discovery paused");
                    }
                }
            }
        }

        if sink.is_closed() {
            break;
        }

        let wake = tokio::select! {
            event = adapter_events.next() => Wake::Adapter(event),
            event = next_discovered(&mut discovery) => Wake::Discovery(event),
            Some((address, event)) = devices.streams.next() => Wake::Device(address, event),
            _ = retry.tick() => Wake::Retry,
        };

        steps = match wake {
            Wake::Adapter(Some(event)) => translator.translate(Notification::Adapter(event)),
            Wake::Adapter(None) => {
                info!(adapter = adapter.name(), "Adapter event stream closed");
                break;
            }
            Wake::Discovery(Some(event)) => translator.translate(Notification::Discovery(event)),
            Wake::Discovery(None) => {
                debug!(adapter = adapter.name(), "Bluetooth discovery session ended");
                discovery = None;
                Vec::new()
            }
            Wake::Device(address, event) => {
                translator.translate(Notification::Device(address, event))
            }
            Wake::Retry => translator.retry(discovery.is_some()),
        };
    }

    info!(adapter = adapter.name(), "Bluetooth event pump ended");
    Ok(())
}

// =============================================================================
// ADAPTER CONTROL
// =============================================================================

/// Powers the BlueZ adapter on when asked to enable it.
pub struct BluezAdapterControl {
    adapter_name: Option<String>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl BluezAdapterControl {
    /// Control for the named adapter, or the default adapter when `None`.
    #[must_use]
    pub fn new(adapter_name: Option<String>) -> Self {
        Self {
            adapter_name,
            pending: Mutex::new(Vec::new()),
        }
    }
}

async fn power_on(adapter_name: Option<&str>) -> Result<bool> {
    let adapter = open_adapter(adapter_name).await?;
    adapter.set_powered(true).await?;
    Ok(adapter.is_powered().await?)
}

impl AdapterControl for BluezAdapterControl {
    fn request_enable(&self, sink: PresenceSink) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| LinkupError::RuntimeUnavailable)?;

        let adapter_name = self.adapter_name.clone();
        let handle = runtime.spawn(async move {
            match power_on(adapter_name.as_deref()).await {
                Ok(enabled) => {
                    sink.deliver(PresenceEvent::AdapterStateChanged { enabled });
                }
                Err(err) => warn!(error = %err, "Adapter power-on failed"),
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
        Ok(())
    }

    fn release(&self) {
        for handle in self.pending.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAdapterControl, MockEventSource};
    use crate::{AdapterState, PresenceTracker};
    use std::sync::Arc;

    const ADDRESS: Address = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn sink() -> (PresenceTracker, PresenceSink) {
        let source = Arc::new(MockEventSource::new());
        let tracker = PresenceTracker::new(source.clone(), Arc::new(MockAdapterControl::new()));
        tracker.start();
        let sink = source.current_sink().unwrap();
        (tracker, sink)
    }

    fn powered(enabled: bool) -> Notification {
        Notification::Adapter(AdapterEvent::PropertyChanged(AdapterProperty::Powered(enabled)))
    }

    fn device(property: DeviceProperty) -> Notification {
        Notification::Device(ADDRESS, DeviceEvent::PropertyChanged(property))
    }

    fn adapter_changed(enabled: bool) -> Step {
        Step::Deliver(PresenceEvent::AdapterStateChanged { enabled })
    }

    #[test]
    fn test_power_cycle_pauses_and_resumes_discovery() {
        let mut translator = Translator::default();

        // Off at startup: no discovery, and retries stay idle.
        assert_eq!(translator.power(false), vec![adapter_changed(false)]);
        assert!(translator.retry(false).is_empty());

        assert_eq!(
            translator.translate(powered(true)),
            vec![adapter_changed(true), Step::StartDiscovery]
        );
        assert_eq!(translator.translate(powered(true)), vec![adapter_changed(true)]);
        assert_eq!(
            translator.translate(powered(false)),
            vec![adapter_changed(false), Step::StopDiscovery]
        );
        assert!(translator.retry(false).is_empty());

        assert_eq!(
            translator.translate(powered(true)),
            vec![adapter_changed(true), Step::StartDiscovery]
        );
        assert_eq!(
            translator.translate(powered(false)),
            vec![adapter_changed(false), Step::StopDiscovery]
        );
    }

    #[test]
    fn test_retry_restarts_discovery_only_while_powered() {
        let mut translator = Translator::default();
        translator.power(true);
        assert_eq!(translator.retry(false), vec![Step::StartDiscovery]);
        assert!(translator.retry(true).is_empty());

        translator.power(false);
        assert!(translator.retry(false).is_empty());
    }

    #[test]
    fn test_power_cycle_reaches_tracker_state() {
        let (tracker, sink) = sink();
        let mut changes = tracker.subscribe_changes();
        let mut translator = Translator::default();

        let mut seen = Vec::new();
        for notification in [powered(false), powered(true), powered(false), powered(true)] {
            for step in translator.translate(notification) {
                if let Step::Deliver(event) = step {
                    assert!(sink.deliver(event));
                }
            }
            seen.push(tracker.adapter_state());
        }

        assert_eq!(
            seen,
            vec![
                AdapterState::Off,
                AdapterState::On,
                AdapterState::Off,
                AdapterState::On
            ]
        );
        let mut published = 0;
        while changes.try_recv().is_ok() {
            published += 1;
        }
        assert_eq!(published, 4);
    }

    #[test]
    fn test_discovered_devices_are_inspected_before_reporting() {
        let mut translator = Translator::default();
        assert_eq!(
            translator.translate(Notification::Discovery(AdapterEvent::DeviceAdded(ADDRESS))),
            vec![Step::Inspect(ADDRESS)]
        );
        assert_eq!(
            translator.translate(device(DeviceProperty::Rssi(-60))),
            vec![Step::Inspect(ADDRESS)]
        );
        // Property changes seen by discovery are handled on the adapter stream.
        assert!(translator
            .translate(Notification::Discovery(AdapterEvent::PropertyChanged(
                AdapterProperty::Powered(true)
            )))
            .is_empty());
        assert!(!translator.powered);
    }

    #[test]
    fn test_device_list_changes_adjust_watches() {
        let mut translator = Translator::default();
        assert_eq!(
            translator.translate(Notification::Adapter(AdapterEvent::DeviceAdded(ADDRESS))),
            vec![Step::Watch(ADDRESS)]
        );
        assert_eq!(
            translator.translate(Notification::Adapter(AdapterEvent::DeviceRemoved(ADDRESS))),
            vec![Step::Forget(ADDRESS)]
        );
    }

    #[test]
    fn test_connected_property_maps_to_link_events() {
        let mut translator = Translator::default();
        assert_eq!(
            translator.translate(device(DeviceProperty::Connected(true))),
            vec![Step::Deliver(PresenceEvent::LinkConnected {
                address: "AA:BB:CC:DD:EE:FF".to_string()
            })]
        );
        assert_eq!(
            translator.translate(device(DeviceProperty::Connected(false))),
            vec![Step::Deliver(PresenceEvent::LinkDisconnected {
                address: "AA:BB:CC:DD:EE:FF".to_string()
            })]
        );
    }

    #[test]
    fn test_other_properties_are_unrecognized() {
        let mut translator = Translator::default();
        assert!(matches!(
            translator.translate(device(DeviceProperty::Trusted(true))).as_slice(),
            [Step::Deliver(PresenceEvent::Unrecognized { .. })]
        ));
        assert!(matches!(
            translator
                .translate(Notification::Adapter(AdapterEvent::PropertyChanged(
                    AdapterProperty::Discoverable(true)
                )))
                .as_slice(),
            [Step::Deliver(PresenceEvent::Unrecognized { .. })]
        ));
    }

    #[test]
    fn test_register_outside_runtime_fails() {
        let (_tracker, sink) = sink();
        let source = BluezEventSource::new(None);
        assert!(matches!(
            source.register(sink),
            Err(LinkupError::RuntimeUnavailable)
        ));
    }

    #[test]
    fn test_unregister_without_registration_fails() {
        let source = BluezEventSource::new(None);
        assert!(matches!(
            source.unregister(),
            Err(LinkupError::NotRegistered)
        ));
    }

    #[test]
    fn test_enable_outside_runtime_fails() {
        let (_tracker, sink) = sink();
        let control = BluezAdapterControl::new(Some("hci0".to_string()));
        assert!(matches!(
            control.request_enable(sink),
            Err(LinkupError::RuntimeUnavailable)
        ));
        control.release();
    }

    #[tokio::test]
    async fn test_register_then_unregister() {
        let (_tracker, sink) = sink();
        let source = BluezEventSource::new(None);

        tokio_test::assert_ok!(source.register(sink));
        tokio_test::assert_ok!(source.unregister());
        tokio_test::assert_err!(source.unregister());
    }
}
