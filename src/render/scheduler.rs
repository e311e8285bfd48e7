use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{DisplayError, DisplaySink, LogAggregator, RenderPolicy};
use crate::events::{CommandChannel, Event, EventSender};
use crate::metrics::Metrics;
use crate::models::RenderSettings;

/// Tuning for [`RenderScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Events drained from the channel per tick
    pub batch_cap: usize,
    /// Share of `tick_interval` non-log events may consume
    pub budget_fraction: f64,
    pub log_capacity: usize,
    /// Prefix log lines with `[HH:MM:SS]`
    pub timestamp_lines: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&RenderSettings::default())
    }
}

impl From<&RenderSettings> for SchedulerConfig {
    fn from(render: &RenderSettings) -> Self {
        Self {
            tick_interval: render.tick_interval(),
            batch_cap: render.batch_cap.max(1),
            budget_fraction: render.budget_fraction.clamp(0.0, 1.0),
            log_capacity: render.log_capacity,
            timestamp_lines: true,
        }
    }
}

impl SchedulerConfig {
    pub fn budget(&self) -> Duration {
        self.tick_interval.mul_f64(self.budget_fraction)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events taken off the channel this tick
    pub drained: usize,
    /// Events applied to the display, log lines included
    pub applied: usize,
    /// Non-log events left over for the next tick
    pub deferred: usize,
    /// Display updates that failed
    pub errors: usize,
}

impl TickReport {
    /// Nothing was drained and nothing is waiting.
    pub fn is_idle(&self) -> bool {
        self.drained == 0 && self.deferred == 0
    }
}

/// Ticks per second, averaged over roughly one-second windows.
#[derive(Debug)]
struct TickRateMeter {
    window_start: Instant,
    ticks: u32,
    rate: f64,
}

impl TickRateMeter {
    fn new(tick_interval: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            ticks: 0,
            rate: 1.0 / tick_interval.as_secs_f64(),
        }
    }

    /// Count a tick. Returns the new rate when a window closes.
    fn record(&mut self, now: Instant) -> Option<f64> {
        self.ticks += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        self.rate = f64::from(self.ticks) / elapsed.as_secs_f64();
        self.ticks = 0;
        self.window_start = now;
        Some(self.rate)
    }
}

/// Per-tick pump from the command channel to the display.
///
/// # Tick
///
/// 1. Display errors from the previous tick are logged as ordinary lines.
/// 2. Up to `batch_cap` events are drained.
/// 3. Log lines go to the [`LogAggregator`] as one batch.
/// 4. Other events join a deferred queue and are applied in order until the
///    time budget is spent; at least one is applied per tick, so a slow
///    display still makes progress.
///
/// A failing display update never stops the tick or the loop.
pub struct RenderScheduler {
    channel: CommandChannel,
    logs: LogAggregator,
    deferred: VecDeque<Event>,
    carried_errors: Vec<String>,
    config: SchedulerConfig,
    rate: TickRateMeter,
    metrics: Arc<Metrics>,
}

impl RenderScheduler {
    pub fn new(
        channel: CommandChannel,
        config: SchedulerConfig,
        policy: RenderPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        let logs = LogAggregator::new(config.log_capacity, policy)
            .with_timestamps(config.timestamp_lines);
        Self {
            channel,
            logs,
            deferred: VecDeque::new(),
            carried_errors: Vec::new(),
            rate: TickRateMeter::new(config.tick_interval),
            config,
            metrics,
        }
    }

    pub fn sender(&self) -> EventSender {
        self.channel.sender()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn policy(&self) -> RenderPolicy {
        self.logs.policy()
    }

    /// Switch the log policy; takes effect on the next tick.
    pub fn set_policy(&mut self, policy: RenderPolicy) {
        tracing::debug!("Log render policy set to {:?}", policy);
        self.logs.set_policy(policy);
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.logs
    }

    /// Last measured ticks per second
    pub fn tick_rate(&self) -> f64 {
        self.rate.rate
    }

    pub fn clear_log(&mut self, sink: &mut dyn DisplaySink) {
        if let Err(e) = self.logs.clear(sink) {
            self.carry_error(e);
        }
    }

    /// Run one tick against `sink`.
    pub fn tick(&mut self, sink: &mut dyn DisplaySink) -> TickReport {
        let started = Instant::now();
        let budget = self.config.budget();
        let mut report = TickReport::default();

        let mut lines: Vec<String> = self
            .carried_errors
            .drain(..)
            .map(|e| format!("[ERROR] Display update failed: {e}"))
            .collect();

        let drained = self.channel.drain_up_to(self.config.batch_cap);
        report.drained = drained.len();
        for event in drained {
            match event {
                Event::Log(line) => lines.push(line),
                other => self.deferred.push_back(other),
            }
        }

        let line_count = lines.len();
        match self.logs.render(lines, sink) {
            Ok(()) => report.applied += line_count,
            Err(e) => {
                report.errors += 1;
                self.carry_error(e);
            }
        }

        let mut applied_events = 0usize;
        while !self.deferred.is_empty() {
            if applied_events > 0 && started.elapsed() >= budget {
                break;
            }
            let Some(event) = self.deferred.pop_front() else {
                break;
            };
            applied_events += 1;
            if let Err(e) = apply(&event, sink) {
                report.errors += 1;
                self.carry_error(e);
            }
        }
        report.applied += applied_events;
        report.deferred = self.deferred.len();

        if let Some(rate) = self.rate.record(Instant::now()) {
            if let Err(e) = sink.set_tick_rate(rate) {
                report.errors += 1;
                self.carry_error(e);
            }
        }

        self.metrics.record_events_applied(report.applied);
        self.metrics.record_tick(report.deferred > 0);
        report
    }

    fn carry_error(&mut self, error: DisplayError) {
        tracing::warn!("Display update failed: {}", error);
        self.metrics.record_display_error();
        self.carried_errors.push(error.to_string());
    }
}

fn apply(event: &Event, sink: &mut dyn DisplaySink) -> Result<(), DisplayError> {
    match event {
        Event::Log(line) => sink.append_log(line),
        Event::Progress(percent) => sink.set_progress(*percent),
        Event::Status(text) => sink.set_status(text),
        Event::ButtonsEnabled(enabled) => sink.set_controls_enabled(*enabled),
    }
}
