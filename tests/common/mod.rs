//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use tokio::runtime::Handle;
use update_manager::events::{CommandChannel, Event};
use update_manager::metrics::Metrics;
use update_manager::render::{DisplayError, DisplaySink};
use update_manager::services::{CommandSpec, ProcessError, ProcessOutput, ProcessRunner};
use update_manager::{Coordinator, OperationGate, Settings};

mock! {
    pub Runner {}

    #[async_trait]
    impl ProcessRunner for Runner {
        async fn execute(
            &self,
            spec: &CommandSpec,
            timeout: Duration,
            capture_output: bool,
        ) -> Result<ProcessOutput, ProcessError>;
    }
}

/// In-memory display that records every update it is given.
#[derive(Default)]
pub struct RecordingDisplay {
    pub log: Vec<String>,
    pub progress: Vec<u8>,
    pub status: Vec<String>,
    pub controls: Vec<bool>,
    pub replacements: usize,
    /// Time each non-log update takes to apply
    pub delay: Option<Duration>,
}

impl RecordingDisplay {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }
}

impl DisplaySink for RecordingDisplay {
    fn append_log(&mut self, line: &str) -> Result<(), DisplayError> {
        self.log.push(line.to_string());
        Ok(())
    }

    fn replace_log(&mut self, lines: &[&str]) -> Result<(), DisplayError> {
        self.replacements += 1;
        self.log = lines.iter().map(|l| l.to_string()).collect();
        Ok(())
    }

    fn set_progress(&mut self, percent: u8) -> Result<(), DisplayError> {
        self.pause();
        self.progress.push(percent);
        Ok(())
    }

    fn set_status(&mut self, text: &str) -> Result<(), DisplayError> {
        self.pause();
        self.status.push(text.to_string());
        Ok(())
    }

    fn set_controls_enabled(&mut self, enabled: bool) -> Result<(), DisplayError> {
        self.pause();
        self.controls.push(enabled);
        Ok(())
    }
}

/// Channel, coordinator and gate wired together on the current runtime.
pub struct Harness {
    pub channel: CommandChannel,
    pub coordinator: Arc<Coordinator>,
    pub gate: OperationGate,
}

impl Harness {
    pub fn new(settings: Settings) -> Self {
        let metrics = Arc::new(Metrics::new());
        let channel = CommandChannel::with_metrics(Arc::clone(&metrics));
        let coordinator = Arc::new(Coordinator::new(settings, metrics));
        let gate = OperationGate::new(
            Arc::clone(&coordinator),
            channel.sender(),
            Handle::current(),
        );
        Self {
            channel,
            coordinator,
            gate,
        }
    }

    /// Everything sent so far, in order.
    pub fn drain(&mut self) -> Vec<Event> {
        self.channel.drain_up_to(usize::MAX)
    }
}

pub fn log_lines(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Log(line) => Some(line.clone()),
            _ => None,
        })
        .collect()
}

pub fn progress_values(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

/// True when `spec` is a PowerShell call whose script contains `needle`.
pub fn script_contains(spec: &CommandSpec, needle: &str) -> bool {
    spec.script().is_some_and(|s| s.contains(needle))
}
