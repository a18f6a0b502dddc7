//! Handle over one appliance session.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::activity::{ActivityGuard, ActivitySlot};
use super::{Activity, SessionState};
use crate::batch::Command;
use crate::error::{CommandError, ConnectionError, ConnectionFailure, ToolboxError};
use crate::response::{parse_admin_sessions, Response};
use crate::transport::{ConnectParams, Connector, Interrupt, Transport, TransportError};
use crate::Result;

/// Default time allowed for authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed for one command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Query listing the administrators currently logged in.
pub const DEFAULT_USERS_QUERY: &str = "monitor admin";

/// Account name of the appliance super-user.
const SUPER_USER: &str = "admin";

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub users_query: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            users_query: DEFAULT_USERS_QUERY.to_string(),
        }
    }
}

type SharedTransport = Arc<Mutex<Option<Box<dyn Transport>>>>;

/// One authenticated connection to one appliance.
///
/// Transport calls are serialized: each [`send`](Self::send) holds the
/// transport exclusively for the duration of the call and runs on the
/// blocking pool. The command timeout covers both waiting for the
/// transport and the call itself. A call that overruns it is interrupted
/// and the session moves to [`SessionState::Failed`].
pub struct SessionHandle {
    params: ConnectParams,
    options: SessionOptions,
    transport: SharedTransport,
    interrupter: RwLock<Option<Arc<dyn Interrupt>>>,
    state: watch::Sender<SessionState>,
    warnings: RwLock<Vec<String>>,
    activity: Arc<ActivitySlot>,
}

impl SessionHandle {
    /// Create a disconnected handle.
    pub fn new(params: ConnectParams, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            params,
            options,
            transport: Arc::new(Mutex::new(None)),
            interrupter: RwLock::new(None),
            state,
            warnings: RwLock::new(Vec::new()),
            activity: Arc::new(ActivitySlot::default()),
        }
    }

    pub fn host(&self) -> &str {
        &self.params.host
    }

    pub fn port(&self) -> u16 {
        self.params.port
    }

    pub fn user(&self) -> &str {
        &self.params.user
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Conflicts found when the session was opened.
    pub fn active_user_warnings(&self) -> Vec<String> {
        self.warnings.read().map(|w| w.clone()).unwrap_or_default()
    }

    /// Long-running activity currently holding the session, if any.
    pub fn current_activity(&self) -> Option<Activity> {
        self.activity.current()
    }

    pub(crate) fn claim(&self, activity: Activity) -> Result<ActivityGuard> {
        self.activity.try_claim(activity)
    }

    fn transition(&self, target: SessionState) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| match state.transition_to(target) {
            Ok(()) => true,
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome.map_err(ToolboxError::from)
    }

    /// Authenticate against the appliance.
    ///
    /// Connecting an already connected handle is a no-op. Logged-in
    /// administrator conflicts are collected as warnings and never block
    /// the connection.
    pub async fn connect(&self, connector: Arc<dyn Connector>) -> Result<()> {
        if self.state().is_connected() {
            return Ok(());
        }
        self.transition(SessionState::Connecting)?;
        info!(
            host = %self.params.host,
            port = self.params.port,
            user = %self.params.user,
            "connecting to appliance"
        );

        let params = self.params.clone();
        let task = tokio::task::spawn_blocking(move || connector.connect(&params));

        let outcome = match tokio::time::timeout(self.options.connect_timeout, task).await {
            Err(_) => Err(ConnectionError::new(
                ConnectionFailure::Timeout,
                format!(
                    "no answer from {} within {:?}",
                    self.params.endpoint(),
                    self.options.connect_timeout
                ),
            )),
            Ok(Err(join)) => Err(ConnectionError::new(
                ConnectionFailure::Environment,
                join.to_string(),
            )),
            Ok(Ok(result)) => result,
        };

        match outcome {
            Ok(transport) => {
                self.set_interrupter(transport.interrupter());
                let stale = self.transport.lock().await.replace(transport);
                if let Some(stale) = stale {
                    close_in_background(stale);
                }
                self.transition(SessionState::Connected)?;
                info!(host = %self.params.host, "connected");
                self.collect_warnings().await;
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::Failed)?;
                warn!(
                    host = %self.params.host,
                    reason = %e.reason,
                    "connection failed: {}",
                    e.detail
                );
                Err(e.into())
            }
        }
    }

    async fn collect_warnings(&self) {
        let mut warnings = Vec::new();
        let user = self.params.user.as_str();

        if user.eq_ignore_ascii_case(SUPER_USER) {
            warnings.push(format!(
                "connected with the '{}' super-user account",
                SUPER_USER
            ));
        }

        let query = Command::new(self.options.users_query.as_str());
        match self.send(&query).await {
            Ok(output) => warnings.extend(admin_conflicts(&output, user)),
            Err(e) => debug!("logged-in administrators unavailable: {}", e),
        }

        for warning in &warnings {
            warn!(host = %self.params.host, "{}", warning);
        }
        if let Ok(mut slot) = self.warnings.write() {
            *slot = warnings;
        }
    }

    /// Send one command and return its payload text.
    pub async fn send(&self, command: &Command) -> std::result::Result<String, CommandError> {
        let raw = self
            .exchange(command.as_str(), |transport, text| transport.send(text))
            .await?;
        Response::parse(&raw).into_output()
    }

    /// Run a command whose result is a downloaded payload.
    pub async fn download(&self, command: &Command) -> std::result::Result<Vec<u8>, CommandError> {
        self.exchange(command.as_str(), |transport, text| transport.download(text))
            .await
    }

    /// Acquire the private-data rights ticket.
    pub async fn acquire_rights(&self) -> std::result::Result<(), CommandError> {
        self.send(&Command::new("system right ticket acquire"))
            .await
            .map(|_| ())
    }

    /// Release the private-data rights ticket.
    pub async fn release_rights(&self) -> std::result::Result<(), CommandError> {
        self.send(&Command::new("system right ticket release"))
            .await
            .map(|_| ())
    }

    async fn exchange<T, F>(&self, text: &str, op: F) -> std::result::Result<T, CommandError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Transport, &str) -> std::result::Result<T, TransportError>
            + Send
            + 'static,
    {
        if !self.state().is_connected() {
            return Err(CommandError::not_connected());
        }

        let timeout = self.options.command_timeout;
        let deadline = Instant::now() + timeout;
        let lock = Arc::clone(&self.transport).lock_owned();
        let Ok(mut guard) = tokio::time::timeout_at(deadline, lock).await else {
            return Err(CommandError::timeout(format!(
                "transport still busy after {:?}",
                timeout
            )));
        };
        if !self.state().is_connected() {
            return Err(CommandError::not_connected());
        }

        let text = text.to_string();
        debug!(command = %text, "sending");
        let task = tokio::task::spawn_blocking(move || match guard.as_mut() {
            Some(transport) => op(transport.as_mut(), &text),
            None => Err(TransportError::Closed),
        });

        match tokio::time::timeout_at(deadline, task).await {
            Err(_) => {
                self.abandon_transport();
                Err(CommandError::timeout(format!("no answer within {:?}", timeout)))
            }
            Ok(Err(join)) => Err(CommandError::remote(join.to_string())),
            Ok(Ok(result)) => result.map_err(CommandError::from),
        }
    }

    /// Give up on a call that overran its deadline.
    ///
    /// The blocking call keeps the transport locked until it returns, so
    /// the session is marked failed and the call is interrupted.
    fn abandon_transport(&self) {
        warn!(host = %self.params.host, "command timed out, dropping the session");
        self.interrupt();
        if let Err(e) = self.transition(SessionState::Failed) {
            debug!("state unchanged on timeout: {}", e);
        }
    }

    fn interrupt(&self) {
        let interrupter = self.interrupter.read().ok().and_then(|slot| slot.clone());
        if let Some(interrupter) = interrupter {
            interrupter.interrupt();
        }
    }

    fn set_interrupter(&self, interrupter: Option<Arc<dyn Interrupt>>) {
        if let Ok(mut slot) = self.interrupter.write() {
            *slot = interrupter;
        }
    }

    /// Release the transport. Safe to call any number of times.
    ///
    /// A call still running on the transport is interrupted first.
    pub async fn disconnect(&self) {
        let mut slot = match Arc::clone(&self.transport).try_lock_owned() {
            Ok(slot) => slot,
            Err(_) => {
                self.interrupt();
                let lock = Arc::clone(&self.transport).lock_owned();
                match tokio::time::timeout(self.options.command_timeout, lock).await {
                    Ok(slot) => slot,
                    Err(_) => {
                        warn!(host = %self.params.host, "transport did not release, abandoning it");
                        self.finish_disconnect();
                        return;
                    }
                }
            }
        };

        let transport = slot.take();
        drop(slot);
        match transport {
            Some(mut transport) => {
                if let Err(e) = tokio::task::spawn_blocking(move || transport.close()).await {
                    warn!("transport close failed: {}", e);
                }
                info!(host = %self.params.host, "disconnected");
            }
            None => debug!(host = %self.params.host, "already disconnected"),
        }
        self.finish_disconnect();
    }

    fn finish_disconnect(&self) {
        self.set_interrupter(None);
        if self.state() != SessionState::Disconnected {
            if let Err(e) = self.transition(SessionState::Disconnected) {
                debug!("state unchanged on disconnect: {}", e);
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        match self.transport.try_lock() {
            Ok(mut slot) => {
                if let Some(transport) = slot.take() {
                    close_in_background(transport);
                }
            }
            // A detached blocking call still owns the transport.
            Err(_) => self.interrupt(),
        }
    }
}

/// Close a transport off the async worker threads when a runtime is around.
fn close_in_background(mut transport: Box<dyn Transport>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(move || transport.close());
        }
        Err(_) => transport.close(),
    }
}

/// Turn a logged-in administrator listing into warnings.
///
/// The listing includes our own session, so the connecting user conflicts
/// only when listed more than once. Any super-user session counts when we
/// are not the super-user ourselves.
fn admin_conflicts(output: &str, user: &str) -> Vec<String> {
    let sessions = parse_admin_sessions(output);
    let mut warnings = Vec::new();

    let own = sessions
        .iter()
        .filter(|s| s.user.eq_ignore_ascii_case(user))
        .count();
    if own > 1 {
        warnings.push(format!(
            "user '{}' already holds {} other session(s)",
            user,
            own - 1
        ));
    }

    if !user.eq_ignore_ascii_case(SUPER_USER) {
        for session in sessions
            .iter()
            .filter(|s| s.user.eq_ignore_ascii_case(SUPER_USER))
        {
            match &session.address {
                Some(address) => warnings.push(format!(
                    "administrator '{}' is connected from {}",
                    session.user, address
                )),
                None => warnings.push(format!("administrator '{}' is connected", session.user)),
            }
        }
    }

    warnings
}
