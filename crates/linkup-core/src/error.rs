//! Unified error types for the linkup core library.
//!
//! [`LinkupError`] covers every failure mode of the presence tracker and its
//! ambient layers. The configuration module keeps its own
//! [`ConfigError`](crate::config::ConfigError) for detailed validation reports
//! and converts into this type at the crate boundary.
//!
//! Most tracker operations never return these errors: lifecycle and host
//! failures are logged and swallowed by
//! [`PresenceTracker`](crate::presence::PresenceTracker). They surface from the
//! lower-level [`EventSource`](crate::source::EventSource) and
//! [`AdapterControl`](crate::source::AdapterControl) traits, from configuration
//! loading, and from request validation in the HTTP host.
//!
//! # Example
//!
//! ```rust
//! use linkup_core::error::{LinkupError, Result};
//!
//! fn require_address(address: &str) -> Result<()> {
//!     if !linkup_core::is_valid_address(address) {
//!         return Err(LinkupError::InvalidAddress(address.to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_address("AA:BB:CC:DD:EE:FF").is_ok());
//! assert!(require_address("not-an-address").is_err());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all linkup operations.
#[derive(Debug, Error)]
pub enum LinkupError {
    // =========================================================================
    // SUBSCRIPTION LIFECYCLE ERRORS
    // =========================================================================
    /// Unregister was requested but nothing is registered with the source.
    #[error("Event source has no registered receiver")]
    NotRegistered,

    /// Register was requested while a receiver is already registered.
    #[error("Event source already has a registered receiver")]
    AlreadyRegistered,

    /// An async host operation was requested outside of a tokio runtime.
    #[error("No async runtime available to drive the Bluetooth host")]
    RuntimeUnavailable,

    // =========================================================================
    // BLUETOOTH HOST ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    AdapterNotFound,

    /// The Bluetooth host service could not be reached or refused the call.
    #[error("Bluetooth host unavailable: {0}")]
    AdapterUnavailable(String),

    /// The request to power on the adapter could not be issued.
    #[error("Failed to request adapter enable: {0}")]
    EnableRequestFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // REQUEST ERRORS
    // =========================================================================
    /// A device address is not in `XX:XX:XX:XX:XX:XX` form.
    #[error("Invalid device address: '{0}'. Expected format 'AA:BB:CC:DD:EE:FF'.")]
    InvalidAddress(String),

    /// No state has ever been recorded for the device.
    #[error("Device not tracked: '{0}'")]
    DeviceNotFound(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for linkup operations.
pub type Result<T> = std::result::Result<T, LinkupError>;

/// Short alias for [`LinkupError`].
pub type Error = LinkupError;

impl LinkupError {
    /// Returns `true` if this error comes from registering or unregistering
    /// with an event source.
    #[inline]
    #[must_use]
    pub const fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered | Self::AlreadyRegistered | Self::RuntimeUnavailable
        )
    }

    /// Returns `true` if this error is related to the Bluetooth host.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterNotFound | Self::AdapterUnavailable(_) | Self::EnableRequestFailed(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered | Self::AlreadyRegistered | Self::AdapterUnavailable(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidAddress(_) => 400,

            // 404 Not Found
            Self::ConfigNotFound(_) | Self::DeviceNotFound(_) => 404,

            // 409 Conflict - lifecycle already in the requested state
            Self::NotRegistered | Self::AlreadyRegistered => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::RuntimeUnavailable | Self::IoError(_) => 500,

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::AdapterNotFound | Self::AdapterUnavailable(_) | Self::EnableRequestFailed(_) => {
                503
            }
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotRegistered => "NOT_REGISTERED",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
            Self::AdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::AdapterUnavailable(_) => "BLUETOOTH_UNAVAILABLE",
            Self::EnableRequestFailed(_) => "ENABLE_REQUEST_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for LinkupError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::Write { path, source } => Self::IoError(std::io::Error::new(
                source.kind(),
                format!("Failed to write {}: {source}", path.display()),
            )),
            ConfigError::Validation { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

#[cfg(feature = "bluetooth")]
impl From<bluer::Error> for LinkupError {
    fn from(err: bluer::Error) -> Self {
        match err.kind {
            bluer::ErrorKind::NotFound => Self::AdapterNotFound,
            _ => Self::AdapterUnavailable(err.to_string()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
