use serde::Deserialize;

use super::OperationError;

/// How an operation ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Nothing to do; `subject` names what is current
    UpToDate { subject: String },
    /// Finished with a one-line description
    Completed { message: String },
    /// Per-item results of a multi-package run
    Batch(BatchSummary),
    /// Not attempted, e.g. the category is disabled
    Skipped { reason: String },
}

impl OperationOutcome {
    pub fn up_to_date(subject: impl Into<String>) -> Self {
        OperationOutcome::UpToDate {
            subject: subject.into(),
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        OperationOutcome::Completed {
            message: message.into(),
        }
    }

    /// The single log line that ends the operation.
    pub fn summary_line(&self) -> String {
        match self {
            OperationOutcome::UpToDate { subject } => format!("[OK] {subject} is up to date."),
            OperationOutcome::Completed { message } => format!("[DONE] {message}"),
            OperationOutcome::Batch(summary) => summary.line(),
            OperationOutcome::Skipped { reason } => format!("[SKIP] {reason}"),
        }
    }
}

/// Tally of a batch of package installs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// What the counts refer to, e.g. "Installed"
    pub subject: String,
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// A stop request cut the batch short
    pub stopped_early: bool,
    pub reboot_scheduled: bool,
}

impl BatchSummary {
    pub fn new(subject: impl Into<String>, total: usize) -> Self {
        Self {
            subject: subject.into(),
            total,
            ..Self::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    /// e.g. `[SUMMARY] Installed: 3 succeeded, 2 failed (of 5)`
    pub fn line(&self) -> String {
        let mut counts = format!("{} succeeded", self.succeeded);
        if self.skipped > 0 {
            counts.push_str(&format!(", {} skipped", self.skipped));
        }
        counts.push_str(&format!(", {} failed", self.failed));

        let mut line = format!("[SUMMARY] {}: {} (of {})", self.subject, counts, self.total);
        if self.stopped_early {
            line.push_str(" (stopped early)");
        }
        if self.reboot_scheduled {
            line.push_str(", reboot scheduled");
        }
        line
    }
}

/// One pending update as reported by `Get-WUList | ConvertTo-Json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PendingUpdate {
    #[serde(rename = "Title")]
    pub title: String,

    #[serde(rename = "KB", default)]
    pub kb: Option<String>,

    #[serde(rename = "Size", default)]
    pub size: Option<UpdateSize>,

    #[serde(rename = "Status", default)]
    pub status: Option<String>,
}

/// Sizes arrive as raw bytes or as preformatted text ("54MB").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UpdateSize {
    Bytes(u64),
    Text(String),
}

impl std::fmt::Display for UpdateSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateSize::Bytes(bytes) => write!(f, "{:.1} MB", *bytes as f64 / 1_048_576.0),
            UpdateSize::Text(text) => f.write_str(text),
        }
    }
}

impl PendingUpdate {
    /// `KB5031356 - Title (54 MB)`, omitting what is unknown
    pub fn describe(&self) -> String {
        let mut text = match &self.kb {
            Some(kb) if !kb.is_empty() => format!("{kb} - {}", self.title),
            _ => self.title.clone(),
        };
        if let Some(size) = &self.size {
            text.push_str(&format!(" ({size})"));
        }
        text
    }
}

/// Parse the JSON update list. PowerShell emits a bare object for a single
/// update and nothing at all for none.
pub fn parse_pending_updates(json: &str) -> Result<Vec<PendingUpdate>, OperationError> {
    let json = json.trim();
    if json.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| OperationError::MalformedResult(format!("update list is not JSON: {e}")))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        single => vec![single],
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| {
                OperationError::MalformedResult(format!("unexpected update entry: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_line_omits_zero_skipped() {
        let summary = BatchSummary {
            succeeded: 3,
            failed: 2,
            ..BatchSummary::new("Installed", 5)
        };
        assert_eq!(summary.line(), "[SUMMARY] Installed: 3 succeeded, 2 failed (of 5)");
        assert_eq!(summary.attempted(), 5);
    }

    #[test]
    fn test_batch_line_with_skips_and_stop() {
        let summary = BatchSummary {
            succeeded: 1,
            skipped: 1,
            failed: 0,
            stopped_early: true,
            reboot_scheduled: true,
            ..BatchSummary::new("Installed", 4)
        };
        assert_eq!(
            summary.line(),
            "[SUMMARY] Installed: 1 succeeded, 1 skipped, 0 failed (of 4) (stopped early), reboot scheduled"
        );
    }

    #[test]
    fn test_outcome_lines() {
        assert_eq!(
            OperationOutcome::up_to_date("System").summary_line(),
            "[OK] System is up to date."
        );
        assert_eq!(
            OperationOutcome::completed("Office updated successfully.").summary_line(),
            "[DONE] Office updated successfully."
        );
    }

    #[test]
    fn test_parse_list_and_single_object() {
        let list = r#"[{"Title":"Cumulative Update","KB":"KB5031356","Size":"54MB","Status":"-D-----"},
                       {"Title":"Defender","KB":"KB2267602","Size":1048576}]"#;
        let updates = parse_pending_updates(list).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].describe(), "KB5031356 - Cumulative Update (54MB)");
        assert_eq!(updates[1].describe(), "KB2267602 - Defender (1.0 MB)");

        let single = r#"{"Title":"Only one"}"#;
        assert_eq!(parse_pending_updates(single).unwrap()[0].describe(), "Only one");
    }

    #[test]
    fn test_parse_empty_means_no_updates() {
        assert!(parse_pending_updates("  \n").unwrap().is_empty());
        assert!(parse_pending_updates("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_pending_updates("Get-WUList : not recognized"),
            Err(OperationError::MalformedResult(_))
        ));
        assert!(matches!(
            parse_pending_updates(r#"[{"KB":"KB1"}]"#),
            Err(OperationError::MalformedResult(_))
        ));
    }
}
