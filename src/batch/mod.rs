//! Command batches.
//!
//! This module provides ordered command execution against a session:
//! - Parsing of command files and manual input
//! - Sequential, cancellable execution with progress events
//! - Per-command results and text/JSON reports
//! - One-command-at-a-time terminal use with a short history
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sns_toolbox::batch::{BatchEvent, BatchRunner, CommandBatch};
//! use sns_toolbox::SessionHandle;
//!
//! # async fn run(session: Arc<SessionHandle>) -> sns_toolbox::Result<()> {
//! let batch = CommandBatch::from_text("system ident\n# comment\nmonitor system")?;
//! let (handle, mut events) = BatchRunner::new(session).spawn(batch)?;
//!
//! while let Some(event) = events.recv().await {
//!     if let BatchEvent::Progress { completed, total } = event {
//!         println!("{}/{}", completed, total);
//!     }
//! }
//! let outcome = handle.join().await?;
//! println!("{}", outcome.summary());
//! # Ok(())
//! # }
//! ```

mod command;
mod result;
mod runner;
mod terminal;

pub use command::{
    parse_commands, Command, CommandBatch, CommandHistory, COMMENT_MARKER, HISTORY_CAPACITY,
};
pub use result::{BatchEvent, BatchOutcome, CommandResult};
pub use runner::{BatchHandle, BatchRunner, CancelFlag};
pub use terminal::{Terminal, TerminalReply, HISTORY_BUILTIN};
