use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Flags every PowerShell invocation starts with.
const POWERSHELL_FLAGS: [&str; 5] = [
    "-NoProfile",
    "-NonInteractive",
    "-ExecutionPolicy",
    "Bypass",
    "-Command",
];

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// An external command: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run `script` through Windows PowerShell, non-interactively.
    ///
    /// The script is dedented so it can be written as an indented literal.
    pub fn powershell(script: &str) -> Self {
        Self::new("powershell.exe")
            .args(POWERSHELL_FLAGS)
            .arg(dedent(script))
    }

    /// The script text if this is a PowerShell invocation.
    pub fn script(&self) -> Option<&str> {
        let position = self.args.iter().position(|a| a == "-Command")?;
        self.args.get(position + 1).map(String::as_str)
    }

    pub fn is_powershell(&self) -> bool {
        self.program.eq_ignore_ascii_case("powershell.exe") && self.script().is_some()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_powershell() {
            return write!(f, "{} <script>", self.program);
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Strip the common leading indentation and surrounding blank lines.
fn dedent(script: &str) -> String {
    let indent = script
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    script
        .lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// What an external command produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Trimmed standard output; empty when output was not captured
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or -1 when the process was terminated by a signal
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty stdout lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim_end).filter(|l| !l.trim().is_empty())
    }

    /// Either stream mentions `needle`
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }

    /// Stderr, or stdout when stderr is empty. Used for error details.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Errors raised by a [`ProcessRunner`]
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external commands. The seam between operations and the OS.
///
/// Implementations must enforce `timeout` and must not leave the process
/// running once it expires.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion.
    ///
    /// # Arguments
    /// * `spec` - Program and arguments
    /// * `timeout` - Upper bound on the whole run
    /// * `capture_output` - Capture stdout/stderr; when false the streams are discarded
    async fn execute(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        capture_output: bool,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn execute(
        &self,
        spec: &CommandSpec,
        timeout_duration: Duration,
        capture_output: bool,
    ) -> Result<ProcessOutput, ProcessError> {
        tracing::debug!("Executing: {}", spec);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null()).kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        if capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(|source| ProcessError::Launch {
            program: spec.program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout kills the child.
        let output = timeout(timeout_duration, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!("{} timed out after {:?}", spec.program, timeout_duration);
                ProcessError::Timeout(timeout_duration)
            })?
            .map_err(|source| ProcessError::Launch {
                program: spec.program.clone(),
                source,
            })?;

        let result = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        tracing::debug!("{} exited with code {}", spec.program, result.exit_code);
        Ok(result)
    }
}
