//! Interactive single-command use of a session.

use std::sync::Arc;

use tracing::debug;

use super::command::{Command, CommandHistory, COMMENT_MARKER};
use crate::error::CommandError;
use crate::session::SessionHandle;

/// Line listing the recorded history instead of reaching the appliance.
pub const HISTORY_BUILTIN: &str = "history";

/// What a submitted line produced.
#[derive(Debug, Clone)]
pub enum TerminalReply {
    /// Payload text of the command.
    Output(String),
    Failed(CommandError),
    /// Recorded commands, most recent first.
    History(Vec<String>),
    /// The user asked to leave.
    Quit,
    /// Blank or comment line; nothing was sent.
    Nothing,
}

/// Sends one command per line and remembers what was sent.
pub struct Terminal {
    session: Arc<SessionHandle>,
    history: CommandHistory,
}

impl Terminal {
    pub fn new(session: Arc<SessionHandle>) -> Self {
        Self {
            session,
            history: CommandHistory::new(),
        }
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Handle one input line.
    pub async fn submit(&mut self, line: &str) -> TerminalReply {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            return TerminalReply::Nothing;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            return TerminalReply::Quit;
        }
        if line.eq_ignore_ascii_case(HISTORY_BUILTIN) {
            let entries = self.history.entries().map(str::to_string).collect();
            return TerminalReply::History(entries);
        }

        self.history.record(line);
        match self.session.send(&Command::new(line)).await {
            Ok(output) => TerminalReply::Output(output),
            Err(e) => {
                debug!(command = %line, "terminal command failed: {}", e);
                TerminalReply::Failed(e)
            }
        }
    }
}
