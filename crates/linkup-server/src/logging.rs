//! Tracing subscriber setup.
//!
//! Two layouts, picked by [`LoggingConfig::production`]:
//! - **Production**: JSON lines in a daily rolling file under the log
//!   directory, plus compact uncoloured stdout for the journal
//! - **Development**: pretty, coloured stdout including span open/close events

use std::path::PathBuf;
use std::sync::OnceLock;

use linkup_core::LoggingConfig;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted when `RUST_LOG` is unset.
pub const LEVEL_ENV: &str = "LINKUP_LOG_LEVEL";

const LOG_FILE_PREFIX: &str = "linkup";

/// Flush guards of the background writers, held until process exit.
static WRITER_GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, then [`LEVEL_ENV`], then
/// `config.level`.
///
/// # Errors
///
/// Returns an error if the filter does not parse or the production log
/// directory cannot be created.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = env_filter(&config.level)?;

    if config.production {
        let log_dir = log_directory();
        std::fs::create_dir_all(&log_dir)?;
        init_production(filter, &log_dir);
    } else {
        init_development(filter);
    }

    Ok(())
}

fn env_filter(default_level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());
    Ok(EnvFilter::try_new(level)?)
}

fn background_writer<W>(writer: W, guards: &mut Vec<WorkerGuard>) -> NonBlocking
where
    W: std::io::Write + Send + 'static,
{
    let (writer, guard) = tracing_appender::non_blocking(writer);
    guards.push(guard);
    writer
}

fn init_production(filter: EnvFilter, log_dir: &std::path::Path) {
    let mut guards = Vec::with_capacity(2);
    let file = background_writer(
        RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX),
        &mut guards,
    );
    let stdout = background_writer(std::io::stdout(), &mut guards);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout)
                .with_target(true)
                .with_ansi(false),
        )
        .init();

    // Only the first installation can succeed, so only its guards matter.
    WRITER_GUARDS.set(guards).ok();
}

fn init_development(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .init();
}

/// `/var/log/linkup` on Linux, the platform data directory elsewhere.
fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/linkup")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "linkup")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}
