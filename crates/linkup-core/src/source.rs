//! Seams between the presence tracker and its host environment.
//!
//! A host plugs three things into a [`PresenceTracker`](crate::PresenceTracker):
//!
//! - an [`EventSource`] that pushes raw [`PresenceEvent`]s through a
//!   [`PresenceSink`] while registered,
//! - an [`AdapterControl`] that can ask the host to power the adapter on,
//! - a [`Clock`] used to timestamp discoveries.

use std::fmt;
use std::sync::Weak;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::Result;
use crate::event::PresenceEvent;
use crate::presence::Shared;

/// Handle a host uses to push events into one tracker.
///
/// Sinks handed out by [`PresenceTracker::start`](crate::PresenceTracker::start)
/// belong to a single start/stop cycle. Once the tracker is stopped (or
/// started again) the sink is closed and every delivery is dropped. The sink
/// only holds a weak reference, so a source that outlives its tracker does not
/// keep the tracker's state alive.
#[derive(Clone)]
pub struct PresenceSink {
    shared: Weak<Shared>,
    generation: Option<u64>,
}

impl PresenceSink {
    /// Sink bound to one start/stop cycle of the tracker.
    pub(crate) const fn gated(shared: Weak<Shared>, generation: u64) -> Self {
        Self {
            shared,
            generation: Some(generation),
        }
    }

    /// Sink that delivers for as long as the tracker exists, regardless of
    /// whether it is started. Used for enable-request results.
    pub(crate) const fn open(shared: Weak<Shared>) -> Self {
        Self {
            shared,
            generation: None,
        }
    }

    /// Deliver one event to the tracker.
    ///
    /// Returns `false` when the event was dropped because the sink is closed.
    pub fn deliver(&self, event: PresenceEvent) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            trace!(kind = event.kind(), "Dropping event for released tracker");
            return false;
        };
        if !shared.accepts(self.generation) {
            trace!(kind = event.kind(), "Dropping event delivered to stale sink");
            return false;
        }
        shared.apply(event);
        true
    }

    /// Report that the source stopped delivering for good.
    ///
    /// A tracker still running on this sink's cycle marks itself stopped and
    /// drops the registration, so a later start registers afresh. Closed and
    /// open sinks ignore the call.
    pub fn source_ended(&self) {
        if let (Some(shared), Some(generation)) = (self.shared.upgrade(), self.generation) {
            shared.source_ended(generation);
        }
    }

    /// Whether further deliveries will be dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared
            .upgrade()
            .map_or(true, |shared| !shared.accepts(self.generation))
    }
}

impl fmt::Debug for PresenceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceSink")
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A feed of raw host events.
///
/// Implementations must not block: a source that needs async setup spawns it
/// and reports setup failures through its own logging.
pub trait EventSource: Send + Sync {
    /// Start delivering events into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot attach, e.g. because it is already
    /// registered or no runtime is available to drive it.
    fn register(&self, sink: PresenceSink) -> Result<()>;

    /// Stop delivering events and release the registration.
    ///
    /// # Errors
    ///
    /// Returns [`LinkupError::NotRegistered`](crate::LinkupError::NotRegistered)
    /// when nothing is registered.
    fn unregister(&self) -> Result<()>;
}

/// Requests the host to power on the local adapter.
pub trait AdapterControl: Send + Sync {
    /// Issue an enable request. Fire-and-forget: the outcome, if any, arrives
    /// later as an [`PresenceEvent::AdapterStateChanged`] through `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be issued at all.
    fn request_enable(&self, sink: PresenceSink) -> Result<()>;

    /// Drop any pending enable requests.
    fn release(&self) {}
}

/// Source of discovery timestamps.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
