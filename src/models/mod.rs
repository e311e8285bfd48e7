//! Data models for the update manager.
//!
//! - [`Settings`]: user preferences, timeouts and render tuning persisted to `settings.yaml`
//! - [`OperationState`]: whether the single background slot is taken
//! - [`ModuleAvailability`]: cached status of the PowerShell update module
//!
//! Runtime state lives in [`Coordinator`](crate::state::Coordinator); these types
//! are the plain values it hands out.

pub mod operation;
pub mod settings;

pub use operation::{ModuleAvailability, OperationState};
pub use settings::{
    CATEGORY_DOTNET, CATEGORY_OFFICE, CATEGORY_VCREDIST, CATEGORY_WINDOWS, DOWNLOADS_DIR,
    MANIFEST_FILE, RenderSettings, Settings, TimeoutSettings,
};
