//! Batch result types.

use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Serializer};

use super::command::Command;
use crate::error::CommandError;

/// Width of the separator between rendered results.
const SEPARATOR_WIDTH: usize = 80;

/// Outcome of one command in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub command: Command,
    pub succeeded: bool,
    pub output_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(command: Command, output_text: String, duration: Duration) -> Self {
        Self {
            command,
            succeeded: true,
            output_text,
            error_detail: None,
            duration,
        }
    }

    pub fn failure(command: Command, error: &CommandError, duration: Duration) -> Self {
        Self {
            command,
            succeeded: false,
            output_text: String::new(),
            error_detail: Some(error.to_string()),
            duration,
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<CommandResult>,
    pub total: usize,
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Commands never sent because the batch was cancelled.
    pub fn skipped(&self) -> usize {
        self.total - self.results.len()
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} of {} command(s) succeeded, {} failed",
            self.succeeded(),
            self.total,
            self.failed()
        );
        if self.cancelled {
            summary.push_str(&format!(", cancelled with {} not run", self.skipped()));
        }
        summary
    }

    /// Plain-text report of every result.
    pub fn render_text(&self) -> String {
        let separator = "-".repeat(SEPARATOR_WIDTH);
        let mut out = String::new();

        for result in &self.results {
            let marker = if result.succeeded { "[OK]" } else { "[FAILED]" };
            out.push_str(&format!("{} {}\n", marker, result.command));
            match &result.error_detail {
                Some(detail) => out.push_str(&format!("Error: {}\n", detail)),
                None if result.output_text.is_empty() => out.push_str("No output\n"),
                None => {
                    out.push_str(&result.output_text);
                    out.push('\n');
                }
            }
            out.push_str(&separator);
            out.push('\n');
        }

        out.push_str(&self.summary());
        out.push('\n');
        out
    }

    /// Write the report; `.json` files get JSON, anything else plain text.
    pub fn write_report(&self, path: &Path) -> std::io::Result<()> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let content = if is_json {
            serde_json::to_string_pretty(self)?
        } else {
            self.render_text()
        };
        std::fs::write(path, content)
    }
}

/// Notifications emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// Emitted once before the first command.
    Started { total: usize },
    /// One command finished.
    CommandFinished(CommandResult),
    /// Emitted after each command.
    Progress { completed: usize, total: usize },
    /// Final event, also after cancellation.
    Finished(BatchOutcome),
}
