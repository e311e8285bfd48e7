// State management module
//
// The Coordinator owns everything background operations and the UI thread both
// need to see: the single operation slot, cached module availability, the
// settings and the stop signal.

pub mod gate;

pub use gate::{OperationContext, OperationGate};

use crate::metrics::Metrics;
use crate::models::{ModuleAvailability, OperationState, Settings};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Shared runtime state.
///
/// # Thread Safety
///
/// All methods take `&self` and may be called from the UI thread and from
/// background tasks. The operation slot is a watch channel whose value is
/// only changed through `send_if_modified`, so admission is a single
/// check-and-set and waiters are woken on release. The other fields sit
/// behind short-lived locks that are never held across an `.await`.
///
/// A panic while a lock is held does not wedge the application: poisoned
/// locks are recovered and the data used as-is.
///
/// # Related Types
///
/// - [`OperationGate`]: the only caller of [`try_begin`](Self::try_begin)
/// - [`crate::config::ConfigManager`]: persists what [`update_settings`](Self::update_settings) returns
pub struct Coordinator {
    operation: watch::Sender<OperationState>,
    running_name: Mutex<Option<String>>,
    module: Mutex<ModuleAvailability>,
    settings: RwLock<Settings>,
    stop_tx: watch::Sender<bool>,
    metrics: Arc<Metrics>,
}

impl Coordinator {
    pub fn new(settings: Settings, metrics: Arc<Metrics>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (operation, _) = watch::channel(OperationState::Idle);
        Self {
            operation,
            running_name: Mutex::new(None),
            module: Mutex::new(ModuleAvailability::Unknown),
            settings: RwLock::new(settings),
            stop_tx,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn operation_state(&self) -> OperationState {
        *self.operation.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.operation_state() == OperationState::Running
    }

    /// Name of the operation holding the slot, if any
    pub fn running_operation(&self) -> Option<String> {
        self.running_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Claim the operation slot. Exactly one of several concurrent callers wins.
    ///
    /// The winner also clears any stop request left over from a previous run.
    pub(crate) fn try_begin(&self, name: &str) -> bool {
        let claimed = self.operation.send_if_modified(|state| {
            if *state == OperationState::Idle {
                *state = OperationState::Running;
                true
            } else {
                false
            }
        });
        if claimed {
            *self
                .running_name
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
            self.stop_tx.send_replace(false);
        }
        claimed
    }

    /// Release the operation slot.
    pub(crate) fn finish(&self) {
        self.running_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.operation.send_replace(OperationState::Idle);
    }

    /// Wait until the slot is free or `timeout` passes.
    ///
    /// # Returns
    /// `true` if the coordinator went idle in time
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut state = self.operation.subscribe();
        tokio::time::timeout(
            timeout,
            state.wait_for(|s| *s == OperationState::Idle),
        )
        .await
        .is_ok_and(|waited| waited.is_ok())
    }

    /// Receiver that observes the operation slot.
    pub fn subscribe_state(&self) -> watch::Receiver<OperationState> {
        self.operation.subscribe()
    }

    pub fn module_availability(&self) -> ModuleAvailability {
        *self.module.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_module_availability(&self, availability: ModuleAvailability) {
        let mut module = self.module.lock().unwrap_or_else(PoisonError::into_inner);
        if *module != availability {
            tracing::debug!("Module availability: {:?} -> {:?}", *module, availability);
        }
        *module = availability;
    }

    /// Forget the cached module status so the next operation checks again.
    pub fn invalidate_module(&self) {
        self.set_module_availability(ModuleAvailability::Unknown);
    }

    /// Clone of the current settings
    pub fn settings_snapshot(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the settings
    ///
    /// # Example
    /// ```ignore
    /// let reboot = coordinator.read_settings(|s| s.auto_reboot);
    /// ```
    pub fn read_settings<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Settings) -> R,
    {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        f(&settings)
    }

    /// Mutate the settings and return the result for persisting.
    ///
    /// Operations already running keep the snapshot they started with.
    pub fn update_settings<F>(&self, update_fn: F) -> Settings
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        update_fn(&mut settings);
        settings.clone()
    }

    /// Ask the running operation to stop at its next checkpoint.
    pub fn request_stop(&self) {
        tracing::info!("Stop requested");
        self.stop_tx.send_replace(true);
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Receiver that observes stop requests, for `select!`-style waits.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}
