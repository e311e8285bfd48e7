use thiserror::Error;

use super::process::ProcessError;

/// Why an operation ended without a normal outcome.
///
/// Every variant maps to exactly one summary line via [`summary`](Self::summary).
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("required component is not available: {0}")]
    DependencyMissing(String),

    #[error("could not install {module}: {detail}")]
    DependencyInstallFailed { module: String, detail: String },

    #[error("timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("external command exited with code {code}{}", detail_suffix(.detail))]
    NonZeroExit { code: i32, detail: String },

    #[error("unreadable result: {0}")]
    MalformedResult(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("another operation ({running}) is already running")]
    ConcurrentOperationRejected { requested: String, running: String },

    #[error("could not start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

impl OperationError {
    pub fn non_zero_exit(code: i32, detail: impl Into<String>) -> Self {
        OperationError::NonZeroExit {
            code,
            detail: detail.into().trim().to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, OperationError::Timeout { .. })
    }

    /// The single log line describing how `operation` ended.
    pub fn summary(&self, operation: &str) -> String {
        match self {
            OperationError::Timeout { .. } => format!("[TIMEOUT] {operation} {self}"),
            OperationError::ConcurrentOperationRejected { running, .. } => format!(
                "[WARNING] {operation} was not started: {running} is already running. Please wait."
            ),
            OperationError::ResourceNotFound(_) => format!("[ERROR] {operation}: {self}"),
            _ => format!("[ERROR] {operation} failed: {self}"),
        }
    }
}

impl From<ProcessError> for OperationError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout(duration) => OperationError::Timeout {
                seconds: duration.as_secs(),
            },
            ProcessError::Launch { program, source } => OperationError::Launch { program, source },
        }
    }
}
