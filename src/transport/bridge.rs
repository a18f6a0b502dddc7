//! Transport backed by an external vendor client process.
//!
//! The client is started once per session with `--host`, `--port` and
//! `--user`; the password is written as the first line on its stdin.
//! Afterwards each request is one line on stdin and each answer is read
//! from stdout up to the terminating status line.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{ConnectParams, Connector, Interrupt, Transport, TransportError};
use crate::error::{ConnectionError, ConnectionFailure};
use crate::response::{Response, StatusLine};

/// How long `close` waits for the client to exit after `quit`.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Starts the vendor client program for each new session.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl BridgeConnector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Append arguments passed after the connection flags.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, params: &ConnectParams) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--host")
            .arg(&params.host)
            .arg("--port")
            .arg(params.port.to_string())
            .arg("--user")
            .arg(&params.user);
        if params.verify.verify_host {
            cmd.arg("--verify-host");
        }
        if params.verify.verify_peer {
            cmd.arg("--verify-peer");
        }
        cmd.args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

impl Connector for BridgeConnector {
    fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>, ConnectionError> {
        let mut child = self.command(params).spawn().map_err(|e| {
            ConnectionError::new(
                ConnectionFailure::Environment,
                format!("cannot start vendor client {}: {}", self.program.display(), e),
            )
        })?;
        debug!(pid = child.id(), "vendor client started");

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(ConnectionError::new(
                ConnectionFailure::Environment,
                "vendor client pipes unavailable",
            ));
        };

        let mut transport = BridgeTransport {
            child: Arc::new(Mutex::new(child)),
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            closed: false,
        };

        let greeting = transport
            .write_line(params.password())
            .and_then(|_| transport.read_response())
            .map_err(|e| {
                ConnectionError::new(ConnectionFailure::NetworkUnreachable, e.to_string())
            })?;

        match greeting.status {
            Some(status) if status.is_success() => Ok(Box::new(transport)),
            Some(status) => Err(ConnectionError::classified(status.message)),
            None => Err(ConnectionError::classified(greeting.output)),
        }
    }
}

/// A running vendor client bound to one appliance session.
pub struct BridgeTransport {
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    closed: bool,
}

impl BridgeTransport {
    fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        Ok(())
    }

    /// Read raw lines until a terminating status line.
    fn read_raw(&mut self) -> Result<String, TransportError> {
        let mut raw = String::new();
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(TransportError::Closed);
            }
            trace!(line = line.trim_end(), "vendor client output");
            let terminal = StatusLine::parse(&line).is_some_and(|s| s.is_terminal());
            raw.push_str(&line);
            if terminal {
                return Ok(raw);
            }
        }
    }

    fn read_response(&mut self) -> Result<Response, TransportError> {
        self.read_raw().map(|raw| Response::parse(&raw))
    }
}

impl Transport for BridgeTransport {
    fn send(&mut self, command: &str) -> Result<String, TransportError> {
        self.write_line(command)?;
        self.read_raw()
    }

    fn download(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        let target = tempfile::Builder::new()
            .prefix("sns-download-")
            .tempfile()?
            .into_temp_path();

        // The vendor client saves the payload of `cmd > file` locally.
        self.write_line(&format!("{} > {}", command, target.display()))?;
        let response = self.read_response()?;
        if !response.is_success() {
            let message = response
                .status
                .map(|s| s.message)
                .unwrap_or(response.output);
            return Err(TransportError::Remote(message));
        }

        let payload = std::fs::read(&target)?;
        debug!(bytes = payload.len(), "download complete");
        Ok(payload)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.write_line("quit") {
            debug!("quit not delivered: {}", e);
        }
        // Dropping stdin signals EOF to the client.
        self.stdin = None;

        let Ok(mut child) = self.child.lock() else {
            return;
        };
        let start = Instant::now();
        while start.elapsed() < EXIT_GRACE {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => {
                    warn!("cannot poll vendor client: {}", e);
                    break;
                }
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
        Some(Arc::new(ClientKiller {
            child: Arc::clone(&self.child),
        }))
    }
}

/// Kills the vendor client so a blocked read sees end of stream.
struct ClientKiller {
    child: Arc<Mutex<Child>>,
}

impl Interrupt for ClientKiller {
    fn interrupt(&self) {
        if let Ok(mut child) = self.child.lock() {
            match child.kill() {
                Ok(()) => debug!(pid = child.id(), "vendor client killed"),
                Err(e) => debug!("vendor client already gone: {}", e),
            }
        }
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.close();
    }
}
