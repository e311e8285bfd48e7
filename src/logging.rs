use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how diagnostic logs are written.
///
/// These are the developer-facing logs. The user-facing log pane is fed by
/// the event channel and never goes through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Directory for rotated log files
    pub log_dir: Utf8PathBuf,
    /// File name prefix, e.g. "update-manager"
    pub prefix: String,
    /// Use debug level instead of info
    pub debug: bool,
    /// Mirror output to stderr with colors
    pub console: bool,
}

impl LoggingOptions {
    pub fn new(log_dir: impl Into<Utf8PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            prefix: prefix.into(),
            debug: false,
            console: false,
        }
    }
}

/// Build the level filter. `RUST_LOG` wins when set; otherwise the debug flag decides.
pub fn build_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

/// Make sure the log directory exists.
pub fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Install the global subscriber with a daily rotating file appender.
///
/// # Arguments
/// * `options` - Target directory, prefix, level and console mirroring
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(options: &LoggingOptions) -> Result<WorkerGuard> {
    ensure_log_dir(&options.log_dir)?;

    let file_appender = rolling::daily(&options.log_dir, &options.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = options.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(build_filter(options.debug))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {e}"))?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        options.log_dir,
        options.prefix,
        options.debug,
        options.console
    );

    Ok(guard)
}
