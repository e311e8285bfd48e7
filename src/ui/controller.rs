// GUI Controller - wires the Slint window to the task core
//
// - Slint callbacks → OperationGate submissions and settings changes
// - A repeating Slint timer → RenderScheduler ticks against the window
// - rfd folder picker for the repository path
// - Close confirmation while an operation is running

use super::MainWindow;
use super::display::WindowDisplay;
use crate::config::ConfigManager;
use crate::events::{CommandChannel, EventSender};
use crate::metrics::Metrics;
use crate::models::Settings;
use crate::render::{RenderPolicy, RenderScheduler, SchedulerConfig};
use crate::services::{OperationKind, ProcessRunner, UpdateOperations};
use crate::state::{Coordinator, OperationGate};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use slint::{ComponentHandle, Timer, TimerMode};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Owns the window, the render loop and the operation plumbing.
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let controller = GuiController::new(
///     coordinator,
///     config_manager,
///     Arc::new(SystemProcessRunner::new()),
///     runtime.handle().clone(),
/// )?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    ui: MainWindow,
    coordinator: Arc<Coordinator>,
    gate: OperationGate,
    operations: Arc<UpdateOperations>,
    events: EventSender,
    scheduler: Rc<RefCell<RenderScheduler>>,
    display: Rc<RefCell<WindowDisplay>>,
    render_timer: Timer,
}

impl GuiController {
    pub fn new(
        coordinator: Arc<Coordinator>,
        config_manager: Arc<ConfigManager>,
        process: Arc<dyn ProcessRunner>,
        runtime: Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create main window")?;
        let settings = coordinator.settings_snapshot();
        let metrics: Arc<Metrics> = Arc::clone(coordinator.metrics());

        let channel = CommandChannel::with_metrics(Arc::clone(&metrics));
        let scheduler = RenderScheduler::new(
            channel,
            SchedulerConfig::from(&settings.render),
            settings.render_policy(),
            metrics,
        );
        let events = scheduler.sender();
        let gate = OperationGate::new(Arc::clone(&coordinator), events.clone(), runtime);
        let operations = Arc::new(UpdateOperations::new(process));

        let display = WindowDisplay::new(&ui, settings.render.log_capacity);
        Self::sync_ui_with_settings(&ui, &settings);

        let controller = Self {
            ui,
            coordinator,
            gate,
            operations,
            events,
            scheduler: Rc::new(RefCell::new(scheduler)),
            display: Rc::new(RefCell::new(display)),
            render_timer: Timer::default(),
        };
        controller.setup_operation_callbacks();
        controller.setup_settings_callbacks(&config_manager);
        controller.setup_close_handling();

        tracing::debug!("GUI controller initialized");
        Ok(controller)
    }

    /// Run the GUI event loop (blocks until the window closes).
    pub fn run(self) -> Result<(), slint::PlatformError> {
        self.start_render_loop();

        let settings = self.coordinator.settings_snapshot();
        self.events.log("[INFO] Update Manager ready.");
        self.events
            .log(format!("[INFO] Repository: {}", settings.repo_path));
        self.launch(OperationKind::ModuleCheck);

        tracing::info!("Starting GUI event loop");
        self.ui.run()
    }

    fn start_render_loop(&self) {
        let scheduler = Rc::clone(&self.scheduler);
        let display = Rc::clone(&self.display);
        let interval = scheduler.borrow().config().tick_interval;

        self.render_timer
            .start(TimerMode::Repeated, interval, move || {
                let mut display = display.borrow_mut();
                scheduler.borrow_mut().tick(&mut *display);
            });
        tracing::debug!("Render loop started at {:?} per tick", interval);
    }

    fn launch(&self, kind: OperationKind) {
        Self::submit(&self.operations, &self.gate, kind);
    }

    /// Hand `kind` to the gate. A rejection is already reported by the gate.
    fn submit(operations: &Arc<UpdateOperations>, gate: &OperationGate, kind: OperationKind) {
        if let Err(e) = operations.launch(gate, kind) {
            tracing::debug!("{} not started: {}", kind.label(), e);
        }
    }

    fn sync_ui_with_settings(ui: &MainWindow, settings: &Settings) {
        ui.set_auto_reboot(settings.auto_reboot);
        ui.set_performance_mode(settings.performance_mode);
        ui.set_dark_mode(settings.dark_mode);
        ui.set_repo_path(settings.repo_path.as_str().into());
    }

    fn setup_operation_callbacks(&self) {
        let bind = |kind: OperationKind| {
            let operations = Arc::clone(&self.operations);
            let gate = self.gate.clone();
            move || Self::submit(&operations, &gate, kind)
        };

        self.ui.on_check_updates(bind(OperationKind::Scan));
        self.ui.on_download_updates(bind(OperationKind::Download));
        self.ui.on_install_online(bind(OperationKind::InstallOnline));
        self.ui.on_install_offline(bind(OperationKind::InstallOffline));
        self.ui.on_update_office(bind(OperationKind::UpdateOffice));
        self.ui.on_update_dotnet(bind(OperationKind::UpdateDotnet));
        self.ui.on_update_vcredist(bind(OperationKind::UpdateVcRedist));

        let coordinator = Arc::clone(&self.coordinator);
        let events = self.events.clone();
        self.ui.on_stop_operation(move || {
            if coordinator.is_running() {
                coordinator.request_stop();
                events.log("[STOP] Stop requested; the current step will finish first.");
            }
        });

        let scheduler = Rc::clone(&self.scheduler);
        let display = Rc::clone(&self.display);
        self.ui.on_clear_log(move || {
            let mut display = display.borrow_mut();
            scheduler.borrow_mut().clear_log(&mut *display);
        });
    }

    fn setup_settings_callbacks(&self, config_manager: &Arc<ConfigManager>) {
        let coordinator = Arc::clone(&self.coordinator);
        let config = Arc::clone(config_manager);
        let events = self.events.clone();
        self.ui.on_auto_reboot_toggled(move |enabled| {
            persist(&coordinator, &config, |s| s.auto_reboot = enabled);
            let state = if enabled { "enabled" } else { "disabled" };
            events.log(format!("[INFO] Auto reboot {state}."));
        });

        let coordinator = Arc::clone(&self.coordinator);
        let config = Arc::clone(config_manager);
        let events = self.events.clone();
        let scheduler = Rc::clone(&self.scheduler);
        self.ui.on_performance_mode_toggled(move |enabled| {
            let settings = persist(&coordinator, &config, |s| s.performance_mode = enabled);
            scheduler.borrow_mut().set_policy(settings.render_policy());
            let message = match settings.render_policy() {
                RenderPolicy::Windowed { window } => {
                    format!("[PERF] Performance mode on: showing the last {window} log lines.")
                }
                RenderPolicy::Immediate => "[PERF] Performance mode off.".to_string(),
            };
            events.log(message);
        });

        let coordinator = Arc::clone(&self.coordinator);
        let config = Arc::clone(config_manager);
        let events = self.events.clone();
        self.ui.on_dark_mode_toggled(move |enabled| {
            persist(&coordinator, &config, |s| s.dark_mode = enabled);
            let theme = if enabled { "Dark" } else { "Light" };
            events.log(format!("[INFO] {theme} theme selected."));
        });

        let coordinator = Arc::clone(&self.coordinator);
        let config = Arc::clone(config_manager);
        let events = self.events.clone();
        let ui_weak = self.ui.as_weak();
        self.ui.on_change_repo_path(move || {
            if coordinator.is_running() {
                events.log("[WARNING] The repository cannot change while an operation is running.");
                return;
            }
            let current = coordinator.read_settings(|s| s.repo_path.clone());
            let Some(path) = Self::show_folder_picker("Select Repository Directory", &current) else {
                return;
            };
            if let Err(e) = config.prepare_repository(&path) {
                events.log(format!("[ERROR] {e:#}"));
                return;
            }
            persist(&coordinator, &config, |s| s.repo_path = path.clone());
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_repo_path(path.as_str().into());
            }
            events.log(format!("[INFO] Repository changed to: {path}"));
        });
    }

    fn setup_close_handling(&self) {
        let coordinator = Arc::clone(&self.coordinator);
        let ui_weak = self.ui.as_weak();
        self.ui.window().on_close_requested(move || {
            if coordinator.is_running() {
                tracing::info!("Close requested during an operation - asking for confirmation");
                if let Some(ui) = ui_weak.upgrade() {
                    ui.set_show_close_confirmation(true);
                }
                slint::CloseRequestResponse::KeepWindowShown
            } else {
                tracing::info!("Close requested - allowing window to close");
                slint::CloseRequestResponse::HideWindow
            }
        });

        let coordinator = Arc::clone(&self.coordinator);
        let ui_weak = self.ui.as_weak();
        self.ui.on_confirm_close(move || {
            tracing::warn!("Quit confirmed while an operation is running");
            coordinator.request_stop();
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_close_confirmation(false);
                if let Err(e) = ui.hide() {
                    tracing::error!("Failed to hide window: {}", e);
                }
            }
        });
    }

    /// Show a native folder picker starting at `start`.
    ///
    /// # Returns
    /// The selected directory, or None if cancelled or not valid UTF-8
    fn show_folder_picker(title: &str, start: &Utf8PathBuf) -> Option<Utf8PathBuf> {
        let mut dialog = rfd::FileDialog::new().set_title(title);
        if start.is_dir() {
            dialog = dialog.set_directory(start);
        }

        dialog.pick_folder().and_then(|path| {
            Utf8PathBuf::try_from(path)
                .map_err(|e| {
                    tracing::error!("Failed to convert path to UTF-8: {}", e);
                    e
                })
                .ok()
        })
    }
}

/// Apply `update` to the shared settings and write them to disk.
fn persist<F>(coordinator: &Coordinator, config: &ConfigManager, update: F) -> Settings
where
    F: FnOnce(&mut Settings),
{
    let settings = coordinator.update_settings(update);
    if let Err(e) = config.save_settings(&settings) {
        tracing::warn!("Failed to persist settings: {:#}", e);
    }
    settings
}
