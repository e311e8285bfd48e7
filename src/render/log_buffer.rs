use std::collections::VecDeque;

use super::{DisplayError, DisplaySink};

/// Bounded FIFO of log lines. The oldest lines are evicted once full.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn append(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Append a whole batch. Lines that would be evicted within the same
    /// batch are skipped outright.
    pub fn append_batch<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: ExactSizeIterator,
    {
        let lines = lines.into_iter();
        let skip = lines.len().saturating_sub(self.capacity);
        for line in lines.skip(skip) {
            self.append(line);
        }
    }

    /// The last `k` lines, oldest first.
    pub fn recent_window(&self, k: usize) -> Vec<&str> {
        let start = self.lines.len().saturating_sub(k);
        self.lines.range(start..).map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// How log lines reach the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPolicy {
    /// Every line is appended as it arrives
    Immediate,
    /// The pane is redrawn with the last `window` lines once per tick
    Windowed { window: usize },
}

impl RenderPolicy {
    pub fn from_performance_mode(performance_mode: bool, window: usize) -> Self {
        if performance_mode {
            RenderPolicy::Windowed {
                window: window.max(1),
            }
        } else {
            RenderPolicy::Immediate
        }
    }
}

/// Stores every line in the [`LogBuffer`] and renders per the active policy.
#[derive(Debug)]
pub struct LogAggregator {
    buffer: LogBuffer,
    policy: RenderPolicy,
    timestamps: bool,
}

impl LogAggregator {
    pub fn new(capacity: usize, policy: RenderPolicy) -> Self {
        Self {
            buffer: LogBuffer::new(capacity),
            policy,
            timestamps: true,
        }
    }

    /// Prefix each line with the local wall-clock time (`[HH:MM:SS]`).
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn policy(&self) -> RenderPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RenderPolicy) {
        self.policy = policy;
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Record `lines` and push them to `sink`.
    ///
    /// In windowed mode the pane is replaced once; nothing is redrawn when
    /// `lines` is empty.
    pub fn render(
        &mut self,
        lines: Vec<String>,
        sink: &mut dyn DisplaySink,
    ) -> Result<(), DisplayError> {
        if lines.is_empty() {
            return Ok(());
        }

        let lines: Vec<String> = if self.timestamps {
            let stamp = chrono::Local::now().format("%H:%M:%S").to_string();
            lines
                .into_iter()
                .map(|line| format!("[{stamp}] {line}"))
                .collect()
        } else {
            lines
        };

        match self.policy {
            RenderPolicy::Immediate => {
                let first_new = lines.len().min(self.buffer.capacity());
                self.buffer.append_batch(lines);
                let fresh = self.buffer.recent_window(first_new);
                for line in fresh {
                    sink.append_log(line)?;
                }
                Ok(())
            }
            RenderPolicy::Windowed { window } => {
                self.buffer.append_batch(lines);
                sink.replace_log(&self.buffer.recent_window(window))
            }
        }
    }

    /// Drop the retained history and blank the pane.
    pub fn clear(&mut self, sink: &mut dyn DisplaySink) -> Result<(), DisplayError> {
        self.buffer.clear();
        sink.replace_log(&[])
    }
}
