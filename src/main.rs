//! Update Manager - desktop front end for Windows update tooling
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! The process runs two worlds side by side:
//! - **Main thread**: the Slint event loop, which also drives the render timer
//! - **Tokio workers**: at most one update operation at a time, talking to
//!   PowerShell, `wusa`, DISM and friends
//!
//! # Execution Flow
//!
//! 1. Load `Update Manager Data/settings.yaml` (defaults if missing or corrupt)
//! 2. Initialize logging → logs/update-manager.<date>
//! 3. Create the tokio runtime and the [`Coordinator`]
//! 4. Create the [`GuiController`] and run the event loop until the window closes
//! 5. Signal stop, give the running operation a grace period, shut the runtime down
//!
//! # Platform
//!
//! The update workflows target Windows 10/11. The rest builds anywhere Slint does.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use update_manager::logging::{self, LoggingOptions};
use update_manager::services::SystemProcessRunner;
use update_manager::ui::GuiController;
use update_manager::{APP_NAME, ConfigManager, Coordinator, Metrics, VERSION};

const CONFIG_DIR: &str = "Update Manager Data";
const LOG_DIR: &str = "logs";
const WORKER_THREADS: usize = 2;

/// How long a running operation gets to notice the stop signal on exit.
const STOP_GRACE: Duration = Duration::from_secs(3);
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let config_manager = Arc::new(ConfigManager::new(CONFIG_DIR)?);
    let settings = config_manager.load_settings();

    let _log_guard = logging::setup_logging(&LoggingOptions {
        debug: settings.debug_mode,
        console: cfg!(debug_assertions),
        ..LoggingOptions::new(LOG_DIR, APP_NAME)
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    if let Err(e) = config_manager.prepare_repository(&settings.repo_path) {
        tracing::warn!("{:#}", e);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("update-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let metrics = Arc::new(Metrics::new());
    let coordinator = Arc::new(Coordinator::new(settings, Arc::clone(&metrics)));

    let gui_controller = GuiController::new(
        Arc::clone(&coordinator),
        config_manager,
        Arc::new(SystemProcessRunner::new()),
        runtime.handle().clone(),
    )?;

    tracing::info!("GUI controller initialized, launching window");

    // Blocks until the window is closed
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");

    if coordinator.is_running() {
        tracing::warn!(
            "Window closed during {} - requesting stop",
            coordinator
                .running_operation()
                .unwrap_or_else(|| "an operation".to_string())
        );
        coordinator.request_stop();
        if !runtime.block_on(coordinator.wait_idle(STOP_GRACE)) {
            tracing::warn!("Operation still running after {:?}; abandoning it", STOP_GRACE);
        }
    }

    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    metrics.log_summary();

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
