// Update Manager - desktop front end for Windows update tooling
//
// This is the library crate: the task-execution core (event channel, render
// scheduler, operation gate, update workflows) and its data structures.
// The binary crate (main.rs) provides the GUI entry point.

pub mod config;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod render;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use events::{CommandChannel, Event, EventSender};
pub use metrics::Metrics;
pub use models::{ModuleAvailability, OperationState, Settings};
pub use render::{DisplayError, DisplaySink, RenderPolicy, RenderScheduler};
pub use services::{OperationError, OperationKind, UpdateOperations};
pub use state::{Coordinator, OperationGate};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
