//! Repeating status poll.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::query::MonitorQuery;
use crate::error::{CommandError, StateError};
use crate::session::{Activity, ActivityGuard, SessionHandle};
use crate::Result;

/// Default delay between two ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Capacity of the monitor event channel.
const EVENT_BUFFER: usize = 16;

/// How long the final `Stopped` event waits for room in a full channel.
const STOPPED_DELIVERY: Duration = Duration::from_secs(1);

/// Lifecycle of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl MonitorState {
    /// Valid transitions:
    /// - Idle -> Running
    /// - Running -> Stopped
    /// - Stopped -> Running
    pub fn can_transition_to(&self, target: MonitorState) -> bool {
        use MonitorState::*;
        matches!(
            (*self, target),
            (Idle, Running) | (Running, Stopped) | (Stopped, Running)
        )
    }
}

/// Notifications from the monitor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Started { query: String },
    /// Fresh output; replaces the previously displayed value.
    Updated { query: String, output: String },
    /// The tick failed; the job keeps running.
    Error { query: String, message: String },
    Stopped { query: String },
}

struct RunningJob {
    query: MonitorQuery,
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningJob {
    /// Ask the loop to stop and wait for the in-flight tick to finish.
    async fn shutdown(self) {
        let _ = self.stop_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(query = %self.query, "monitor task ended abnormally: {}", e);
        }
    }
}

/// Polls one query against a session until stopped.
///
/// At most one job runs per monitor; starting a different query stops the
/// current one first.
pub struct Monitor {
    session: Arc<SessionHandle>,
    events: mpsc::Sender<MonitorEvent>,
    state: Arc<watch::Sender<MonitorState>>,
    job: Mutex<Option<RunningJob>>,
}

impl Monitor {
    pub fn new(session: Arc<SessionHandle>) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let (state, _) = watch::channel(MonitorState::Idle);
        let monitor = Self {
            session,
            events,
            state: Arc::new(state),
            job: Mutex::new(None),
        };
        (monitor, rx)
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Query of the running job, if any.
    pub async fn current_query(&self) -> Option<MonitorQuery> {
        self.job
            .lock()
            .await
            .as_ref()
            .filter(|job| !job.task.is_finished())
            .map(|job| job.query.clone())
    }

    /// Start polling `query` every `interval`.
    ///
    /// Rejected if the same query is already running. A different running
    /// query is stopped first, which also resets the interval timer.
    pub async fn start(&self, query: MonitorQuery, interval: Duration) -> Result<()> {
        let mut job = self.job.lock().await;

        if let Some(running) = job.as_ref() {
            if running.query == query && !running.task.is_finished() {
                return Err(StateError::AlreadyRunning(query.name().to_string()).into());
            }
        }
        if let Some(previous) = job.take() {
            info!(from = %previous.query, to = %query, "switching monitored query");
            previous.shutdown().await;
        }

        if !self.session.state().is_connected() {
            return Err(CommandError::not_connected().into());
        }
        let guard = self.session.claim(Activity::Monitor)?;
        let interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };

        set_state(&self.state, MonitorState::Running);
        info!(query = %query, ?interval, "monitor started");

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let task = tokio::spawn(run_loop(
            Arc::clone(&self.session),
            query.clone(),
            interval,
            stop_rx,
            self.events.clone(),
            Arc::clone(&self.state),
            guard,
        ));

        *job = Some(RunningJob {
            query,
            stop_tx,
            task,
        });
        Ok(())
    }

    /// Stop the running job. Idempotent.
    pub async fn stop(&self) {
        let running = self.job.lock().await.take();
        match running {
            Some(job) => job.shutdown().await,
            None => debug!("monitor not running"),
        }
    }
}

fn set_state(state: &watch::Sender<MonitorState>, target: MonitorState) {
    state.send_if_modified(|current| {
        if current.can_transition_to(target) {
            *current = target;
            true
        } else {
            false
        }
    });
}

async fn run_loop(
    session: Arc<SessionHandle>,
    query: MonitorQuery,
    interval: Duration,
    mut stop_rx: mpsc::Receiver<()>,
    events: mpsc::Sender<MonitorEvent>,
    state: Arc<watch::Sender<MonitorState>>,
    _guard: ActivityGuard,
) {
    let name = query.name().to_string();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut session_state = session.subscribe();

    let _ = events.try_send(MonitorEvent::Started { query: name.clone() });

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => break,
            changed = session_state.changed() => {
                if changed.is_err() || !session_state.borrow().is_connected() {
                    info!(query = %name, "session closed, monitor ending");
                    break;
                }
            }
            _ = ticker.tick() => {
                // The tick runs to completion; stop is only seen between ticks.
                let event = match tick(&session, &query).await {
                    Ok(output) => MonitorEvent::Updated {
                        query: name.clone(),
                        output,
                    },
                    Err(e) => {
                        warn!(query = %name, "monitor tick failed: {}", e);
                        MonitorEvent::Error {
                            query: name.clone(),
                            message: e.to_string(),
                        }
                    }
                };
                // A slow consumer only misses stale values.
                if let Err(mpsc::error::TrySendError::Full(_)) = events.try_send(event) {
                    debug!(query = %name, "monitor event dropped, receiver lagging");
                }
            }
        }
    }

    set_state(&state, MonitorState::Stopped);
    info!(query = %name, "monitor stopped");
    // Bounded so that stop() returns even when nobody drains the channel;
    // the state watch still reports Stopped in that case.
    let stopped = MonitorEvent::Stopped { query: name.clone() };
    if let Err(e) = events.send_timeout(stopped, STOPPED_DELIVERY).await {
        debug!(query = %name, "stop event not delivered: {}", e);
    }
}

async fn tick(
    session: &SessionHandle,
    query: &MonitorQuery,
) -> std::result::Result<String, CommandError> {
    let mut outputs = Vec::with_capacity(query.commands().len());
    for command in query.commands() {
        outputs.push(session.send(command).await?);
    }
    Ok(outputs.join("\n"))
}
