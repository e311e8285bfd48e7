//! Synthesized progress for operations whose tools report none.
//!
//! Nothing here measures real work. The update tools run as opaque blocking
//! calls, so progress is paced by time: a quick ramp while preparing, a slow
//! creep while the external command runs, and a quick ramp once its output is
//! in. The bar is a liveness signal for the user, not telemetry.
//!
//! # Guarantees
//!
//! - Values only increase between the start of an operation and its reset.
//! - A normal finish emits exactly 100 before the hold and the reset to 0.
//! - A zero pacing delay never sleeps, so tests run without real time passing.

use std::future::Future;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval, sleep};

use crate::events::EventSender;

/// One leg of the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPhase {
    pub start: u8,
    pub end: u8,
    pub step: u8,
    pub pacing: Duration,
}

impl ProgressPhase {
    pub const fn new(start: u8, end: u8, step: u8, pacing: Duration) -> Self {
        Self {
            start,
            end,
            step,
            pacing,
        }
    }

    /// Position `done` of `total` inside this phase.
    pub fn fraction(&self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.end;
        }
        let span = usize::from(self.end.saturating_sub(self.start));
        let offset = span * done.min(total) / total;
        self.start.saturating_add(offset as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPlan {
    /// Preparation before the external command, 0 to 30
    pub setup: ProgressPhase,
    /// While the external command runs, 30 to 70
    pub blocking: ProgressPhase,
    /// Interpreting the result, 70 to 100
    pub interpret: ProgressPhase,
    /// How long 100% stays visible before the reset
    pub hold: Duration,
}

impl Default for ProgressPlan {
    fn default() -> Self {
        Self {
            setup: ProgressPhase::new(0, 30, 2, Duration::from_millis(50)),
            blocking: ProgressPhase::new(30, 70, 1, Duration::from_millis(750)),
            interpret: ProgressPhase::new(70, 100, 2, Duration::from_millis(20)),
            hold: Duration::from_millis(750),
        }
    }
}

impl ProgressPlan {
    /// Same shape, no pacing and no hold.
    pub fn immediate() -> Self {
        let paced = Self::default();
        Self {
            setup: ProgressPhase {
                pacing: Duration::ZERO,
                ..paced.setup
            },
            blocking: ProgressPhase {
                pacing: Duration::ZERO,
                ..paced.blocking
            },
            interpret: ProgressPhase {
                pacing: Duration::ZERO,
                ..paced.interpret
            },
            hold: Duration::ZERO,
        }
    }
}

/// Emits paced `Progress` events for one operation run.
pub struct ProgressSynth {
    events: EventSender,
    plan: ProgressPlan,
    current: u8,
}

impl ProgressSynth {
    pub fn new(events: EventSender, plan: ProgressPlan) -> Self {
        Self {
            events,
            plan,
            current: 0,
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub fn plan(&self) -> &ProgressPlan {
        &self.plan
    }

    fn emit(&mut self, value: u8) {
        let value = value.min(100);
        if value > self.current {
            self.current = value;
            self.events.progress(u32::from(value));
        }
    }

    /// Step toward `target`, sleeping `pacing` between steps.
    pub async fn advance_to(&mut self, target: u8, step: u8, pacing: Duration) {
        let target = target.min(100);
        let step = step.max(1);
        while self.current < target {
            let next = self.current.saturating_add(step).min(target);
            self.emit(next);
            if !pacing.is_zero() {
                sleep(pacing).await;
            }
        }
    }

    /// Ramp within the setup phase, never past its end.
    pub async fn setup_to(&mut self, percent: u8) {
        let phase = self.plan.setup;
        self.advance_to(percent.min(phase.end), phase.step, phase.pacing)
            .await;
    }

    pub async fn complete_setup(&mut self) {
        let phase = self.plan.setup;
        self.advance_to(phase.end, phase.step, phase.pacing).await;
    }

    /// Await `work` while creeping through the blocking phase.
    ///
    /// The creep stops one short of the phase end; the end is reached only
    /// once `work` completes. Tracking several calls in a row continues the
    /// same creep.
    pub async fn track<F>(&mut self, work: F) -> F::Output
    where
        F: Future,
    {
        let phase = self.plan.blocking;
        self.advance_to(phase.start, phase.step, Duration::ZERO).await;
        let ceiling = phase.end.saturating_sub(1);

        let output = if phase.pacing.is_zero() {
            work.await
        } else {
            tokio::pin!(work);
            let mut ticker = interval(phase.pacing.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    output = &mut work => break output,
                    _ = ticker.tick() => {
                        if self.current < ceiling {
                            let next = self.current.saturating_add(phase.step.max(1)).min(ceiling);
                            self.emit(next);
                        }
                    }
                }
            }
        };

        self.advance_to(phase.end, phase.step, Duration::ZERO).await;
        output
    }

    /// Place the bar at item `done` of `total` within the blocking phase.
    pub fn batch_progress(&mut self, done: usize, total: usize) {
        let value = self.plan.blocking.fraction(done, total);
        self.emit(value);
    }

    /// Ramp to exactly 100, hold, then reset to 0.
    pub async fn finish(&mut self) {
        let phase = self.plan.interpret;
        self.advance_to(100, phase.step, phase.pacing).await;
        if !self.plan.hold.is_zero() {
            sleep(self.plan.hold).await;
        }
        self.reset();
    }

    pub fn reset(&mut self) {
        self.current = 0;
        self.events.progress(0);
    }
}
