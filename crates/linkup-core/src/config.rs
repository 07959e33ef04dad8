//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file (`/etc/linkup/config.toml` on Linux),
//! 3. `LINKUP__*` environment variables, with `__` separating sections
//!    (e.g. `LINKUP__SERVER__PORT=8080`).
//!
//! Every loaded configuration is validated; all problems are reported at once.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::presence::DEFAULT_CHANGE_CAPACITY;

/// Largest accepted change stream buffer.
pub const MAX_CHANGE_CAPACITY: usize = 4096;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "LINKUP";

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("valid regex"));

static ADAPTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^hci[0-9]+$").expect("valid regex"));

static LOG_DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_:\-]+=)?(trace|debug|info|warn|error|off)$").expect("valid regex")
});

/// Whether `address` looks like a Bluetooth hardware address (`AA:BB:CC:DD:EE:FF`).
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_RE.is_match(address)
}

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    Validation {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkupConfig {
    /// Presence tracker settings.
    pub tracker: TrackerConfig,

    /// HTTP host settings.
    pub server: ServerConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Presence tracker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Host adapter name (e.g. `hci0`). The default adapter is used when unset.
    pub adapter: Option<String>,

    /// Start consuming host events as soon as the process is up.
    pub autostart: bool,

    /// Buffer size of the change stream.
    pub change_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            autostart: true,
            change_capacity: DEFAULT_CHANGE_CAPACITY,
        }
    }
}

/// HTTP host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,

    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// JSON file logs plus compact stdout instead of pretty stdout.
    pub production: bool,

    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            production: false,
            level: "info".to_string(),
        }
    }
}

impl LinkupConfig {
    /// Load configuration from `path` (or the default location) and the
    /// environment.
    ///
    /// An explicitly given `path` must exist; the default location is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if required && !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let file = File::from(path.as_path())
            .format(FileFormat::Toml)
            .required(required);
        Self::layered(file, true)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or validation fails.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::layered(File::from_str(content, FileFormat::Toml), false)
    }

    fn layered<S>(file: S, with_env: bool) -> ConfigResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file);
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a single problem and
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: String| {
            errors.push(ConfigError::Validation {
                field: field.to_string(),
                message,
            });
        };

        if let Some(adapter) = &self.tracker.adapter {
            if !ADAPTER_RE.is_match(adapter) {
                invalid(
                    "tracker.adapter",
                    format!("'{adapter}' is not an adapter name like 'hci0'"),
                );
            }
        }
        if !(1..=MAX_CHANGE_CAPACITY).contains(&self.tracker.change_capacity) {
            invalid(
                "tracker.change_capacity",
                format!("must be between 1 and {MAX_CHANGE_CAPACITY}"),
            );
        }
        if self.server.host.parse::<IpAddr>().is_err() {
            invalid(
                "server.host",
                format!("'{}' is not an IP address", self.server.host),
            );
        }
        if self.server.port == 0 {
            invalid("server.port", "must not be 0".to_string());
        }
        if !is_valid_log_filter(&self.logging.level) {
            invalid(
                "logging.level",
                format!("'{}' is not a log filter", self.logging.level),
            );
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Default configuration file location.
    ///
    /// On Linux: `/etc/linkup/config.toml`.
    /// Elsewhere: the platform config directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/linkup/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "linkup").map_or_else(
                || PathBuf::from("linkup.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }
}

fn is_valid_log_filter(filter: &str) -> bool {
    !filter.is_empty()
        && filter
            .split(',')
            .all(|directive| LOG_DIRECTIVE_RE.is_match(directive.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LinkupConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.tracker.autostart);
        assert_eq!(config.tracker.change_capacity, DEFAULT_CHANGE_CAPACITY);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LinkupConfig::from_toml_str(
            r#"
            [tracker]
            adapter = "hci1"

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.tracker.adapter.as_deref(), Some("hci1"));
        assert!(config.tracker.autostart);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let result = LinkupConfig::from_toml_str(
            r#"
            [tracker]
            adapter = "bluetooth0"
            change_capacity = 0

            [server]
            host = "localhost"
            port = 0

            [logging]
            level = "loud"
            "#,
        );

        let Err(ConfigError::MultipleValidationErrors(errors)) = result else {
            panic!("expected multiple validation errors");
        };
        let fields: Vec<String> = errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::Validation { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            fields,
            [
                "tracker.adapter",
                "tracker.change_capacity",
                "server.host",
                "server.port",
                "logging.level"
            ]
        );
    }

    #[test]
    fn test_single_problem_is_not_wrapped() {
        let result = LinkupConfig::from_toml_str("[server]\nport = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_log_filter_directives() {
        assert!(is_valid_log_filter("info"));
        assert!(is_valid_log_filter("warn,linkup_core=debug"));
        assert!(is_valid_log_filter("tower_http::trace=trace"));
        assert!(!is_valid_log_filter(""));
        assert!(!is_valid_log_filter("verbose"));
    }

    #[test]
    fn test_multi_directive_level_passes_validation() {
        let mut config = LinkupConfig::default();
        config.logging.level = "info,tower_http=debug".to_string();
        assert!(config.validate().is_ok());

        config.logging.level = "info,tower_http=loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let result = LinkupConfig::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::NotFound(p)) if p == path));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = LinkupConfig::default();
        config.tracker.adapter = Some("hci0".to_string());
        config.tracker.autostart = false;
        config.logging.production = true;
        config.save(&path).unwrap();

        let loaded = LinkupConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.tracker, config.tracker);
        assert!(loaded.logging.production);
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_address("0a:1b:2c:3d:4e:5f"));
        assert!(!is_valid_address("AA:BB"));
        assert!(!is_valid_address("AA-BB-CC-DD-EE-FF"));
        assert!(!is_valid_address("GG:BB:CC:DD:EE:FF"));
    }
}
