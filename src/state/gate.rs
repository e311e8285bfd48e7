//! Single-flight admission for background operations.
//!
//! [`OperationGate::run_exclusive`] is the only way work leaves the UI thread.
//! It either claims the coordinator's operation slot and spawns the work, or
//! refuses synchronously. The slot is released by a drop guard, so it is
//! freed on success, on error and on panic alike.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::Coordinator;
use crate::events::EventSender;
use crate::models::Settings;
use crate::services::OperationError;

/// What a running operation gets to work with.
pub struct OperationContext {
    /// Display name, e.g. "Check for updates"
    pub name: String,
    pub events: EventSender,
    pub coordinator: Arc<Coordinator>,
    /// Settings as they were when the operation was admitted
    pub settings: Settings,
}

impl OperationContext {
    pub fn stop_requested(&self) -> bool {
        self.coordinator.stop_requested()
    }
}

/// Re-enables controls and releases the operation slot when dropped.
///
/// The enable event goes out before the slot is freed, so the disable event of
/// any operation admitted next is always queued after it.
struct RunningGuard {
    coordinator: Arc<Coordinator>,
    events: EventSender,
    name: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.events.controls_enabled(true);
        self.coordinator.finish();
        tracing::debug!("Operation slot released by {}", self.name);
    }
}

#[derive(Clone)]
pub struct OperationGate {
    coordinator: Arc<Coordinator>,
    events: EventSender,
    runtime: Handle,
}

impl OperationGate {
    pub fn new(coordinator: Arc<Coordinator>, events: EventSender, runtime: Handle) -> Self {
        Self {
            coordinator,
            events,
            runtime,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Run `operation` in the background unless another one holds the slot.
    ///
    /// On admission the controls are disabled and the work is spawned on the
    /// runtime. When it ends with an error or a panic, one summary line and a
    /// progress reset are emitted. Either way the slot is released and the
    /// controls re-enabled.
    ///
    /// # Errors
    /// [`OperationError::ConcurrentOperationRejected`] when the slot is taken.
    /// A warning line is logged and the running operation is left untouched.
    pub fn run_exclusive<F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<JoinHandle<()>, OperationError>
    where
        F: FnOnce(OperationContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
    {
        let metrics = Arc::clone(self.coordinator.metrics());

        if !self.coordinator.try_begin(name) {
            let running = self
                .coordinator
                .running_operation()
                .unwrap_or_else(|| "another operation".to_string());
            let err = OperationError::ConcurrentOperationRejected {
                requested: name.to_string(),
                running,
            };
            tracing::warn!("Rejected {}: {}", name, err);
            metrics.record_operation_rejected();
            self.events.log(err.summary(name));
            return Err(err);
        }

        metrics.record_operation_started();
        tracing::info!("Starting operation: {}", name);
        self.events.controls_enabled(false);

        let guard = RunningGuard {
            coordinator: Arc::clone(&self.coordinator),
            events: self.events.clone(),
            name: name.to_string(),
        };
        let context = OperationContext {
            name: name.to_string(),
            events: self.events.clone(),
            coordinator: Arc::clone(&self.coordinator),
            settings: self.coordinator.settings_snapshot(),
        };
        let events = self.events.clone();
        let name = name.to_string();
        let runtime = self.runtime.clone();

        Ok(self.runtime.spawn(async move {
            let _guard = guard;
            // A nested task so a panic surfaces as a JoinError here.
            let outcome = runtime.spawn(operation(context)).await;
            match outcome {
                Ok(Ok(())) => tracing::info!("Operation finished: {}", name),
                Ok(Err(err)) => {
                    tracing::error!("Operation {} failed: {}", name, err);
                    metrics.record_operation_failed();
                    events.log(err.summary(&name));
                    events.status(format!("{name} did not complete."));
                    events.progress(0);
                }
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        "it panicked"
                    } else {
                        "it was cancelled"
                    };
                    tracing::error!("Operation {} aborted: {}", name, reason);
                    metrics.record_operation_failed();
                    events.log(format!("[ERROR] {name} aborted unexpectedly ({reason})."));
                    events.status(format!("{name} did not complete."));
                    events.progress(0);
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CommandChannel, Event};
    use crate::metrics::Metrics;
    use crate::models::OperationState;

    fn simulate_panic() -> bool {
        true
    }

    fn setup() -> (Arc<Coordinator>, CommandChannel) {
        let metrics = Arc::new(Metrics::new());
        let coordinator = Arc::new(Coordinator::new(Settings::default(), Arc::clone(&metrics)));
        (coordinator, CommandChannel::with_metrics(metrics))
    }

    #[tokio::test]
    async fn test_successful_operation_releases_slot() {
        let (coordinator, mut channel) = setup();
        let gate = OperationGate::new(Arc::clone(&coordinator), channel.sender(), Handle::current());

        let handle = gate
            .run_exclusive("Check for updates", |ctx| async move {
                ctx.events.log("working");
                Ok(())
            })
            .unwrap();
        handle.await.unwrap();

        assert_eq!(coordinator.operation_state(), OperationState::Idle);
        assert_eq!(
            channel.drain_up_to(10),
            vec![
                Event::ButtonsEnabled(false),
                Event::log("working"),
                Event::ButtonsEnabled(true),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_operation_emits_one_summary() {
        let (coordinator, mut channel) = setup();
        let gate = OperationGate::new(Arc::clone(&coordinator), channel.sender(), Handle::current());

        gate.run_exclusive("Install offline", |_| async {
            Err(OperationError::ResourceNotFound("No update files found".to_string()))
        })
        .unwrap()
        .await
        .unwrap();

        let events = channel.drain_up_to(10);
        let logs: Vec<&Event> = events.iter().filter(|e| e.is_log()).collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0],
            &Event::log("[ERROR] Install offline: No update files found")
        );
        assert!(events.contains(&Event::Progress(0)));
        assert_eq!(events.last(), Some(&Event::ButtonsEnabled(true)));
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_panicking_operation_releases_slot() {
        let (coordinator, mut channel) = setup();
        let gate = OperationGate::new(Arc::clone(&coordinator), channel.sender(), Handle::current());

        gate.run_exclusive("Update Office", |_| async {
            if simulate_panic() {
                panic!("collaborator exploded");
            }
            Ok(())
        })
        .unwrap()
        .await
        .unwrap();

        assert!(!coordinator.is_running());
        let events = channel.drain_up_to(10);
        assert!(events.iter().any(|e| matches!(e, Event::Log(l) if l.contains("aborted unexpectedly"))));

        // Slot is usable again
        gate.run_exclusive("Update Office", |_| async { Ok(()) })
            .unwrap()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejection_is_synchronous_and_logged() {
        let (coordinator, mut channel) = setup();
        let gate = OperationGate::new(Arc::clone(&coordinator), channel.sender(), Handle::current());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = gate
            .run_exclusive("Check for updates", |_| async move {
                let _ = release_rx.await;
                Ok(())
            })
            .unwrap();

        let rejected = gate.run_exclusive("Download", |_| async { Ok(()) });
        assert!(matches!(
            rejected,
            Err(OperationError::ConcurrentOperationRejected { ref running, .. }) if running == "Check for updates"
        ));
        assert!(coordinator.is_running());

        release_tx.send(()).unwrap();
        first.await.unwrap();

        let warnings = channel
            .drain_up_to(10)
            .into_iter()
            .filter(|e| matches!(e, Event::Log(l) if l.starts_with("[WARNING]")))
            .count();
        assert_eq!(warnings, 1);
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_context_carries_settings_snapshot() {
        let (coordinator, channel) = setup();
        coordinator.update_settings(|s| s.auto_reboot = true);
        let gate = OperationGate::new(Arc::clone(&coordinator), channel.sender(), Handle::current());

        let (tx, rx) = tokio::sync::oneshot::channel();
        gate.run_exclusive("Install offline", move |ctx| async move {
            let _ = tx.send((ctx.settings.auto_reboot, ctx.name.clone()));
            Ok(())
        })
        .unwrap()
        .await
        .unwrap();

        assert_eq!(rx.await.unwrap(), (true, "Install offline".to_string()));
    }
}
