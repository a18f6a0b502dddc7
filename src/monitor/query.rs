//! Monitor queries and presets.

use std::fmt;

use crate::batch::Command;

/// What a monitor job polls on every tick.
///
/// Most queries are one command; the `ipsec` preset combines the IKE and
/// IPsec SA listings into one display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorQuery {
    name: String,
    commands: Vec<Command>,
}

impl MonitorQuery {
    /// Poll one command, named after its text.
    pub fn single(command: impl Into<String>) -> Self {
        let command = Command::new(command);
        Self {
            name: command.to_string(),
            commands: vec![command],
        }
    }

    /// Resolve a named preset; unknown names map to `monitor <name>`.
    pub fn preset(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        let commands = match name.as_str() {
            "ipsec" => vec![
                Command::new("monitor getikesa"),
                Command::new("monitor getsa"),
            ],
            other => vec![Command::new(format!("monitor {}", other))],
        };
        Self { name, commands }
    }

    pub fn system() -> Self {
        Self::preset("system")
    }

    pub fn ipsec() -> Self {
        Self::preset("ipsec")
    }

    pub fn interface() -> Self {
        Self::preset("interface")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl fmt::Display for MonitorQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
