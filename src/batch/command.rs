//! Command parsing and representation.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lines starting with this marker are ignored.
pub const COMMENT_MARKER: char = '#';

/// Number of entries kept by [`CommandHistory`].
pub const HISTORY_CAPACITY: usize = 20;

/// One appliance CLI command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command {
    raw_text: String,
}

impl Command {
    /// Create a command from its text, trimmed.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw_text: text.trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw_text
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_text)
    }
}

/// Split text into commands: one per line, blank and comment lines dropped.
pub fn parse_commands(text: &str) -> Vec<Command> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(Command::new)
        .collect()
}

/// A non-empty, ordered list of commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<Command>,
}

impl CommandBatch {
    pub fn new(commands: Vec<Command>) -> Result<Self, ValidationError> {
        if commands.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        Ok(Self { commands })
    }

    /// Build a batch from manual multi-line input.
    pub fn from_text(text: &str) -> Result<Self, ValidationError> {
        Self::new(parse_commands(text))
    }

    /// Build a batch from a command file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ValidationError::MalformedFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::from_text(&content)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

impl IntoIterator for CommandBatch {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

/// Recently sent single commands, most recent first, without duplicates.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a command. Already known commands keep their position.
    pub fn record(&mut self, command: &str) {
        let command = command.trim();
        if command.is_empty() || self.entries.iter().any(|c| c == command) {
            return;
        }
        self.entries.push_front(command.to_string());
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}
