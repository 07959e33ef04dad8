//! Application state shared across handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use linkup_core::{LinkupConfig, PresenceTracker};
use tokio::sync::watch;

/// Handle to the application state passed to every handler.
pub type SharedState = Arc<AppState>;

/// Everything the HTTP surface needs, built once at process start.
#[derive(Debug)]
pub struct AppState {
    /// Configuration the process was started with.
    pub config: LinkupConfig,

    /// The presence tracker owned by this process.
    pub tracker: PresenceTracker,

    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Create state around an already constructed tracker.
    #[must_use]
    pub fn new(config: LinkupConfig, tracker: PresenceTracker) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            tracker,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            shutdown,
        }
    }

    /// Wrap into the handle handlers receive.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }

    /// Time since the state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Wall-clock time the state was created.
    #[must_use]
    pub const fn started_at_utc(&self) -> DateTime<Utc> {
        self.started_at_utc
    }

    /// Signal long-lived responses (event streams) to finish.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether [`begin_shutdown`](Self::begin_shutdown) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Receiver that flips to `true` once shutdown begins.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
