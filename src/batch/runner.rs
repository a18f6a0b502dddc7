//! Sequential batch execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command::CommandBatch;
use super::result::{BatchEvent, BatchOutcome, CommandResult};
use crate::error::{CommandError, ToolboxError};
use crate::session::{Activity, SessionHandle};
use crate::Result;

/// Capacity of the batch event channel.
const EVENT_BUFFER: usize = 64;

/// Cancellation request shared with a running batch.
///
/// Checked before each command; a command already sent always completes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Control over a spawned batch.
pub struct BatchHandle {
    cancel: CancelFlag,
    task: JoinHandle<BatchOutcome>,
}

impl BatchHandle {
    /// Stop before the next command.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the batch to finish.
    pub async fn join(self) -> Result<BatchOutcome> {
        self.task
            .await
            .map_err(|e| ToolboxError::Task(e.to_string()))
    }
}

/// Runs command batches against a session.
pub struct BatchRunner {
    session: Arc<SessionHandle>,
}

impl BatchRunner {
    pub fn new(session: Arc<SessionHandle>) -> Self {
        Self { session }
    }

    /// Spawn a batch in the background.
    ///
    /// Fails immediately if the session is not connected or a monitor job
    /// holds it. The batch waits on a full event channel, so drain the
    /// receiver or drop it.
    pub fn spawn(&self, batch: CommandBatch) -> Result<(BatchHandle, mpsc::Receiver<BatchEvent>)> {
        self.spawn_with(batch, CancelFlag::new())
    }

    /// Spawn a batch observing an existing cancel flag.
    pub fn spawn_with(
        &self,
        batch: CommandBatch,
        cancel: CancelFlag,
    ) -> Result<(BatchHandle, mpsc::Receiver<BatchEvent>)> {
        if !self.session.state().is_connected() {
            return Err(CommandError::not_connected().into());
        }
        let guard = self.session.claim(Activity::Batch)?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let session = Arc::clone(&self.session);
        let flag = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            execute(&session, batch, &flag, &tx).await
        });

        Ok((BatchHandle { cancel, task }, rx))
    }

    /// Run a batch on the current task, emitting events to `events`.
    pub async fn run(
        &self,
        batch: CommandBatch,
        cancel: &CancelFlag,
        events: &mpsc::Sender<BatchEvent>,
    ) -> Result<BatchOutcome> {
        if !self.session.state().is_connected() {
            return Err(CommandError::not_connected().into());
        }
        let _guard = self.session.claim(Activity::Batch)?;
        Ok(execute(&self.session, batch, cancel, events).await)
    }
}

async fn execute(
    session: &SessionHandle,
    batch: CommandBatch,
    cancel: &CancelFlag,
    events: &mpsc::Sender<BatchEvent>,
) -> BatchOutcome {
    let total = batch.len();
    let mut results = Vec::with_capacity(total);
    let mut cancelled = false;

    info!(total, host = %session.host(), "batch started");
    // Send errors only mean nobody is listening anymore.
    let _ = events.send(BatchEvent::Started { total }).await;

    for command in batch {
        if cancel.is_cancelled() {
            cancelled = true;
            info!(completed = results.len(), total, "batch cancelled");
            break;
        }

        let start = Instant::now();
        let result = match session.send(&command).await {
            Ok(output) => {
                debug!(command = %command, "command succeeded");
                CommandResult::success(command, output, start.elapsed())
            }
            Err(e) => {
                warn!(command = %command, "command failed: {}", e);
                CommandResult::failure(command, &e, start.elapsed())
            }
        };

        results.push(result.clone());
        let _ = events.send(BatchEvent::CommandFinished(result)).await;
        let _ = events
            .send(BatchEvent::Progress {
                completed: results.len(),
                total,
            })
            .await;
    }

    let outcome = BatchOutcome {
        results,
        total,
        cancelled,
    };
    info!(
        succeeded = outcome.succeeded(),
        failed = outcome.failed(),
        cancelled,
        "batch finished"
    );
    let _ = events.send(BatchEvent::Finished(outcome.clone())).await;
    outcome
}
