//! UI-thread side of the task core.
//!
//! The [`RenderScheduler`] runs once per tick on the UI thread. It drains the
//! [`CommandChannel`](crate::events::CommandChannel), feeds log lines through
//! the [`LogAggregator`] and applies the remaining events to a [`DisplaySink`]
//! inside a time budget.

pub mod log_buffer;
pub mod scheduler;

pub use log_buffer::{LogAggregator, LogBuffer, RenderPolicy};
pub use scheduler::{RenderScheduler, SchedulerConfig, TickReport};

use thiserror::Error;

/// A display update that could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("window is no longer available")]
    WindowClosed,

    #[error("display rejected update: {0}")]
    Rejected(String),
}

/// The surface the scheduler draws on.
///
/// Implemented by the Slint window in the application and by in-memory
/// recorders in tests. Every method runs on the UI thread.
pub trait DisplaySink {
    /// Append one line to the log pane.
    fn append_log(&mut self, line: &str) -> Result<(), DisplayError>;

    /// Replace the log pane contents with `lines`.
    fn replace_log(&mut self, lines: &[&str]) -> Result<(), DisplayError>;

    fn set_progress(&mut self, percent: u8) -> Result<(), DisplayError>;

    fn set_status(&mut self, text: &str) -> Result<(), DisplayError>;

    fn set_controls_enabled(&mut self, enabled: bool) -> Result<(), DisplayError>;

    /// Measured ticks per second, refreshed about once a second.
    fn set_tick_rate(&mut self, _rate: f64) -> Result<(), DisplayError> {
        Ok(())
    }
}
