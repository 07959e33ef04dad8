//! In-memory host doubles.
//!
//! Used by tests and by hosts built without the `bluetooth` feature.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{LinkupError, Result};
use crate::event::PresenceEvent;
use crate::source::{AdapterControl, Clock, EventSource, PresenceSink};

/// Event source driven by hand.
#[derive(Debug, Default)]
pub struct MockEventSource {
    sink: Mutex<Option<PresenceSink>>,
    registrations: AtomicUsize,
}

impl MockEventSource {
    /// Create an unregistered source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an event into the registered sink.
    ///
    /// Returns `false` when nothing is registered or the tracker dropped it.
    pub fn emit(&self, event: PresenceEvent) -> bool {
        // Clone out of the lock: delivery may re-enter the tracker.
        let sink = self.sink.lock().clone();
        sink.is_some_and(|sink| sink.deliver(event))
    }

    /// Push several events in order, returning how many were accepted.
    pub fn emit_all(&self, events: impl IntoIterator<Item = PresenceEvent>) -> usize {
        events
            .into_iter()
            .map(|event| self.emit(event))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Whether a sink is currently registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Number of successful `register` calls so far.
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    /// The currently registered sink, if any.
    #[must_use]
    pub fn current_sink(&self) -> Option<PresenceSink> {
        self.sink.lock().clone()
    }
}

impl EventSource for MockEventSource {
    fn register(&self, sink: PresenceSink) -> Result<()> {
        let mut slot = self.sink.lock();
        if slot.is_some() {
            return Err(LinkupError::AlreadyRegistered);
        }
        *slot = Some(sink);
        self.registrations.fetch_add(1, Ordering::SeqCst);
        debug!("Mock event source registered");
        Ok(())
    }

    fn unregister(&self) -> Result<()> {
        if self.sink.lock().take().is_none() {
            return Err(LinkupError::NotRegistered);
        }
        debug!("Mock event source unregistered");
        Ok(())
    }
}

/// Adapter control that records requests instead of talking to a radio.
#[derive(Debug, Default)]
pub struct MockAdapterControl {
    requests: AtomicUsize,
    releases: AtomicUsize,
    failure: Mutex<Option<String>>,
    auto_accept: bool,
}

impl MockAdapterControl {
    /// Control that records requests and never answers them.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Control that answers every request as if the user accepted.
    #[must_use]
    pub fn accepting() -> Self {
        Self {
            auto_accept: true,
            ..Self::default()
        }
    }

    /// Make subsequent requests fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Number of requests issued, including failed ones.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of `release` calls.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl AdapterControl for MockAdapterControl {
    fn request_enable(&self, sink: PresenceSink) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().clone() {
            return Err(LinkupError::EnableRequestFailed(message));
        }
        if self.auto_accept {
            sink.deliver(PresenceEvent::AdapterStateChanged { enabled: true });
        }
        Ok(())
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
