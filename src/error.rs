//! Error types for sns-toolbox.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::{Activity, SessionState};

/// Why a connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    /// Credentials were rejected by the appliance.
    AuthFailed,
    /// The appliance could not be reached.
    NetworkUnreachable,
    /// TLS handshake or certificate verification failed.
    TlsError,
    /// No answer within the connect timeout.
    Timeout,
    /// The vendor client itself could not be started.
    Environment,
}

impl ConnectionFailure {
    /// Classify a free-form failure message from the vendor client.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls") {
            Self::TlsError
        } else if lower.contains("authentication")
            || lower.contains("login")
            || lower.contains("password")
        {
            Self::AuthFailed
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::NetworkUnreachable
        }
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthFailed => "authentication failed",
            Self::NetworkUnreachable => "network unreachable",
            Self::TlsError => "TLS error",
            Self::Timeout => "timeout",
            Self::Environment => "environment is broken",
        };
        f.write_str(name)
    }
}

/// A failed connection attempt.
#[derive(Error, Debug, Clone)]
#[error("connection failed ({reason}): {detail}")]
pub struct ConnectionError {
    pub reason: ConnectionFailure,
    pub detail: String,
}

impl ConnectionError {
    pub fn new(reason: ConnectionFailure, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// Build an error whose reason is derived from the message text.
    pub fn classified(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            reason: ConnectionFailure::classify(&detail),
            detail,
        }
    }
}

/// Why a single command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFailure {
    NotConnected,
    Timeout,
    RemoteError,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotConnected => "not connected",
            Self::Timeout => "timeout",
            Self::RemoteError => "remote error",
        };
        f.write_str(name)
    }
}

/// A failed command.
#[derive(Error, Debug, Clone)]
#[error("command failed ({reason}): {detail}")]
pub struct CommandError {
    pub reason: CommandFailure,
    pub detail: String,
}

impl CommandError {
    pub fn not_connected() -> Self {
        Self {
            reason: CommandFailure::NotConnected,
            detail: "no active session".into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self {
            reason: CommandFailure::Timeout,
            detail: detail.into(),
        }
    }

    pub fn remote(detail: impl Into<String>) -> Self {
        Self {
            reason: CommandFailure::RemoteError,
            detail: detail.into(),
        }
    }
}

/// Export (backup / system information) failures.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The appliance refused or failed the export request.
    #[error("export request failed: {0}")]
    Command(#[from] CommandError),

    /// The payload could not be written.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `system ident` did not report a system name.
    #[error("system name not found in appliance identity")]
    MissingSystemName,
}

/// Backup decryption failures.
#[derive(Error, Debug)]
pub enum DecryptError {
    /// The decrypt executable is not next to the application.
    #[error("decrypt tool not found at {0}")]
    ToolMissing(PathBuf),

    /// The decrypt tool ran but reported failure.
    #[error("decrypt tool failed (exit code {code:?}): {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    /// The source backup is missing or unusable.
    #[error("invalid backup file {path}: {reason}")]
    InvalidFile { path: PathBuf, reason: String },
}

/// Input rejected before any session call.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The batch has no commands once blank and comment lines are dropped.
    #[error("command batch is empty")]
    EmptyBatch,

    /// The command file could not be read as text.
    #[error("malformed command file {path}: {reason}")]
    MalformedFile { path: PathBuf, reason: String },
}

/// Operation not allowed in the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Invalid session state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// The monitor is already polling this query.
    #[error("monitor already running for '{0}'")]
    AlreadyRunning(String),

    /// Another activity holds the session.
    #[error("session busy: {0} in progress")]
    Busy(Activity),
}

/// Main error type for sns-toolbox operations.
#[derive(Error, Debug)]
pub enum ToolboxError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Convenience Result type for sns-toolbox operations.
pub type Result<T> = std::result::Result<T, ToolboxError>;
