//! Vendor transport abstraction.
//!
//! The SSL session with the appliance is owned by an external vendor
//! client. This module only defines the call contract:
//!
//! - [`Connector::connect`] authenticates and yields a [`Transport`]
//! - [`Transport::send`] exchanges one command for its raw response text
//! - [`Transport::download`] retrieves a binary payload
//!
//! Both traits are blocking; the session layer runs them on the blocking
//! thread pool so async callers never stall. A call that overruns its
//! deadline is aborted through the transport's [`Interrupt`] handle.

mod bridge;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::{CommandError, ConnectionError};

pub use bridge::{BridgeConnector, BridgeTransport};

/// TLS verification switches passed to the vendor client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    pub verify_host: bool,
    pub verify_peer: bool,
}

/// Everything needed to open a session.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    password: Zeroizing<String>,
    pub verify: VerifyOptions,
}

impl ConnectParams {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: Zeroizing::new(password.into()),
            verify: VerifyOptions::default(),
        }
    }

    pub fn with_verify(mut self, verify: VerifyOptions) -> Self {
        self.verify = verify;
        self
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `host:port` for display.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("verify", &self.verify)
            .finish()
    }
}

/// Errors raised by a transport implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The underlying session is gone.
    #[error("transport closed")]
    Closed,

    /// The appliance answered with a failure status.
    #[error("{0}")]
    Remote(String),

    /// The answer could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error talking to the vendor client.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for CommandError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => CommandError::not_connected(),
            other => CommandError::remote(other.to_string()),
        }
    }
}

/// One authenticated connection to an appliance.
pub trait Transport: Send {
    /// Send a command and return the raw response, status lines included.
    fn send(&mut self, command: &str) -> Result<String, TransportError>;

    /// Run a command whose result is a downloaded payload.
    fn download(&mut self, command: &str) -> Result<Vec<u8>, TransportError>;

    /// Release the connection. Called at most once per transport.
    fn close(&mut self);

    /// Handle able to abort a call blocked inside this transport.
    fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
        None
    }
}

/// Aborts the blocking call of a transport from another thread.
///
/// After `interrupt` the pending call returns promptly with an error and
/// the transport is unusable.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

/// Factory for transports.
pub trait Connector: Send + Sync {
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>, ConnectionError>;
}
