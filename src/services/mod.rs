//! Background work: external commands, synthesized progress and the update workflows.
//!
//! - [`process`]: the [`ProcessRunner`] seam and its `tokio::process` implementation
//! - [`progress`]: time-paced progress for opaque blocking calls
//! - [`operations`]: scan, download, install and component updates
//! - [`manifest`]: the JSON record of downloaded packages
//! - [`outcome`]: how operations end and how that is summarized

pub mod error;
pub mod manifest;
pub mod operations;
pub mod outcome;
pub mod process;
pub mod progress;

pub use error::OperationError;
pub use manifest::{ManifestEntry, UpdateManifest};
pub use operations::{OperationKind, UpdateOperations};
pub use outcome::{BatchSummary, OperationOutcome, PendingUpdate};
pub use process::{CommandSpec, ProcessError, ProcessOutput, ProcessRunner, SystemProcessRunner};
pub use progress::{ProgressPhase, ProgressPlan, ProgressSynth};
