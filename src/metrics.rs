// Performance metrics module
//
// Counters for the task-execution core: operations admitted and rejected,
// events crossing the channel, and render-loop health.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Application metrics
///
/// Lock-free counters shared between the UI thread and background operations.
/// A summary is logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Operations admitted by the gate
    pub operations_started: AtomicU64,

    /// Operations refused because another one was running
    pub operations_rejected: AtomicU64,

    /// Operations that ended in an error or a panic
    pub operations_failed: AtomicU64,

    /// Events handed to the command channel
    pub events_sent: AtomicU64,

    /// Events applied to the display
    pub events_applied: AtomicU64,

    /// Display updates that returned an error
    pub display_errors: AtomicU64,

    /// Render ticks executed
    pub render_ticks: AtomicU64,

    /// Ticks whose non-log work was cut short by the time budget
    pub ticks_over_budget: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            operations_started: AtomicU64::new(0),
            operations_rejected: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            events_sent: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            display_errors: AtomicU64::new(0),
            render_ticks: AtomicU64::new(0),
            ticks_over_budget: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_operation_started(&self) {
        self.operations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation_rejected(&self) {
        self.operations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation_failed(&self) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_sent(&self) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events_applied(&self, count: usize) {
        self.events_applied
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_display_error(&self) {
        self.display_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one render tick; `over_budget` marks ticks that deferred work.
    pub fn record_tick(&self, over_budget: bool) {
        self.render_ticks.fetch_add(1, Ordering::Relaxed);
        if over_budget {
            self.ticks_over_budget.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average ticks per second over the whole uptime
    pub fn average_tick_rate(&self) -> f64 {
        let secs = self.uptime().as_secs_f64();
        if secs > 0.0 {
            self.render_ticks.load(Ordering::Relaxed) as f64 / secs
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Operations: {} started, {} rejected, {} failed",
            self.operations_started.load(Ordering::Relaxed),
            self.operations_rejected.load(Ordering::Relaxed),
            self.operations_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Events: {} sent, {} applied, {} display errors",
            self.events_sent.load(Ordering::Relaxed),
            self.events_applied.load(Ordering::Relaxed),
            self.display_errors.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Render: {} ticks ({:.1}/s average), {} over budget",
            self.render_ticks.load(Ordering::Relaxed),
            self.average_tick_rate(),
            self.ticks_over_budget.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.operations_started.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.events_sent.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_operation_counters() {
        let metrics = Metrics::new();

        metrics.record_operation_started();
        metrics.record_operation_started();
        metrics.record_operation_rejected();
        metrics.record_operation_failed();

        assert_eq!(metrics.operations_started.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.operations_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.operations_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_record_tick_tracks_budget_overruns() {
        let metrics = Metrics::new();

        metrics.record_tick(false);
        metrics.record_tick(true);
        metrics.record_tick(false);

        assert_eq!(metrics.render_ticks.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.ticks_over_budget.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_events_applied_accumulates() {
        let metrics = Metrics::new();
        metrics.record_events_applied(50);
        metrics.record_events_applied(7);
        assert_eq!(metrics.events_applied.load(Ordering::Relaxed), 57);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
