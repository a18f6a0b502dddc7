//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sns_toolbox::error::{ConnectionError, ConnectionFailure};
use sns_toolbox::export::{ToolOutput, ToolRunner};
use sns_toolbox::transport::{ConnectParams, Connector, Interrupt, Transport, TransportError};
use sns_toolbox::{SessionHandle, SessionOptions};

pub const OK_STATUS: &str = "100 code=00a00100 msg=\"Ok\"";
pub const ERROR_STATUS: &str = "200 code=00a01000 msg=\"Command error\"";

type SendHook = Box<dyn FnMut(&str) + Send>;

#[derive(Default)]
struct Inner {
    connects: usize,
    closes: usize,
    interrupts: usize,
    sent: Vec<String>,
    failing: HashSet<String>,
    broken: HashSet<String>,
    responses: HashMap<String, String>,
    downloads: HashMap<String, Vec<u8>>,
    connect_error: Option<ConnectionError>,
    delay: Duration,
    in_flight: usize,
    max_in_flight: usize,
    hook: Option<SendHook>,
}

/// In-memory appliance answering with SNS status lines.
#[derive(Clone, Default)]
pub struct FakeAppliance {
    inner: Arc<Mutex<Inner>>,
}

impl FakeAppliance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with a failure status.
    pub fn fail_on(&self, command: &str) -> &Self {
        self.inner.lock().unwrap().failing.insert(command.to_string());
        self
    }

    /// Make the transport itself error on `command`.
    pub fn break_on(&self, command: &str) -> &Self {
        self.inner.lock().unwrap().broken.insert(command.to_string());
        self
    }

    pub fn respond(&self, command: &str, output: &str) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .responses
            .insert(command.to_string(), output.to_string());
        self
    }

    pub fn serve_download(&self, command: &str, payload: &[u8]) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .downloads
            .insert(command.to_string(), payload.to_vec());
        self
    }

    pub fn refuse_connections(&self, error: ConnectionError) -> &Self {
        self.inner.lock().unwrap().connect_error = Some(error);
        self
    }

    /// Time each command takes on the appliance side.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        self.inner.lock().unwrap().delay = delay;
        self
    }

    /// Called after each command is answered.
    pub fn on_send(&self, hook: impl FnMut(&str) + Send + 'static) -> &Self {
        self.inner.lock().unwrap().hook = Some(Box::new(hook));
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Commands sent, minus the logged-in administrators query made on connect.
    pub fn sent_after_connect(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|c| c != sns_toolbox::session::DEFAULT_USERS_QUERY)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.inner.lock().unwrap().sent.clear();
    }

    pub fn connects(&self) -> usize {
        self.inner.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().unwrap().max_in_flight
    }

    /// How many times a pending call was interrupted.
    pub fn interrupts(&self) -> usize {
        self.inner.lock().unwrap().interrupts
    }

    fn exchange(
        &self,
        command: &str,
        download: bool,
        cancelled: &AtomicBool,
    ) -> Result<Vec<u8>, TransportError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.sent.push(command.to_string());
            inner.in_flight += 1;
            inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
            inner.delay
        };
        let start = Instant::now();
        while start.elapsed() < delay && !cancelled.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
        }

        let mut inner = self.inner.lock().unwrap();
        inner.in_flight -= 1;
        if cancelled.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let result = if inner.broken.contains(command) {
            Err(TransportError::Remote(format!("link lost during {}", command)))
        } else if download {
            Ok(inner
                .downloads
                .get(command)
                .cloned()
                .unwrap_or_else(|| command.as_bytes().to_vec()))
        } else if inner.failing.contains(command) {
            Ok(ERROR_STATUS.as_bytes().to_vec())
        } else {
            let output = inner
                .responses
                .get(command)
                .cloned()
                .unwrap_or_else(|| format!("result of {}", command));
            Ok(format!("{}\n{}", output, OK_STATUS).into_bytes())
        };

        if let Some(hook) = inner.hook.as_mut() {
            hook(command);
        }
        result
    }
}

impl Connector for FakeAppliance {
    fn connect(&self, _params: &ConnectParams) -> Result<Box<dyn Transport>, ConnectionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connects += 1;
        if let Some(error) = inner.connect_error.clone() {
            return Err(error);
        }
        Ok(Box::new(FakeTransport {
            appliance: self.clone(),
            closed: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct FakeTransport {
    appliance: FakeAppliance,
    closed: bool,
    cancelled: Arc<AtomicBool>,
}

struct FakeInterrupt {
    appliance: FakeAppliance,
    cancelled: Arc<AtomicBool>,
}

impl Interrupt for FakeInterrupt {
    fn interrupt(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.appliance.inner.lock().unwrap().interrupts += 1;
    }
}

impl Transport for FakeTransport {
    fn send(&mut self, command: &str) -> Result<String, TransportError> {
        if self.closed || self.cancelled.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let bytes = self.appliance.exchange(command, false, &self.cancelled)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn download(&mut self, command: &str) -> Result<Vec<u8>, TransportError> {
        if self.closed || self.cancelled.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.appliance.exchange(command, true, &self.cancelled)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.appliance.inner.lock().unwrap().closes += 1;
        }
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
        Some(Arc::new(FakeInterrupt {
            appliance: self.appliance.clone(),
            cancelled: Arc::clone(&self.cancelled),
        }))
    }
}

pub fn params(user: &str) -> ConnectParams {
    ConnectParams::new("10.0.0.254", 443, user, "secret")
}

pub fn auth_failure() -> ConnectionError {
    ConnectionError::new(ConnectionFailure::AuthFailed, "authentication failed")
}

/// A session connected to `appliance` as `ops`.
pub async fn connected_session(appliance: &FakeAppliance) -> Arc<SessionHandle> {
    connected_session_with(appliance, SessionOptions::default()).await
}

pub async fn connected_session_with(
    appliance: &FakeAppliance,
    options: SessionOptions,
) -> Arc<SessionHandle> {
    let session = Arc::new(SessionHandle::new(params("ops"), options));
    session
        .connect(Arc::new(appliance.clone()))
        .await
        .expect("fake appliance accepts connections");
    session
}

/// Tool runner that records invocations instead of spawning processes.
#[derive(Clone)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    output: ToolOutput,
}

impl RecordingRunner {
    pub fn succeeding() -> Self {
        Self::with_output(ToolOutput {
            success: true,
            exit_code: Some(0),
            stderr: String::new(),
        })
    }

    pub fn failing(code: i32, stderr: &str) -> Self {
        Self::with_output(ToolOutput {
            success: false,
            exit_code: Some(code),
            stderr: stderr.to_string(),
        })
    }

    fn with_output(output: ToolOutput) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            output,
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn run(&self, program: &Path, argument: &Path) -> std::io::Result<ToolOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_path_buf(), argument.to_path_buf()));
        Ok(self.output.clone())
    }
}
