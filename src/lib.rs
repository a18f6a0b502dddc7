//! # sns-toolbox
//!
//! Command and session orchestration for Stormshield SNS appliances.
//!
//! This crate drives an appliance through its administration command
//! channel: it opens an authenticated session, runs ordered command
//! batches, polls monitor queries on an interval, and exports
//! configuration backups and system information.
//!
//! ## Features
//!
//! - **Sessions**: one serialized command channel per appliance, with
//!   connection state notifications and logged-in administrator warnings
//! - **Batches**: ordered, cancellable execution with per-command results
//! - **Monitor**: interval polling that survives failed ticks
//! - **Exports**: backups, system information and local backup decryption
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sns_toolbox::{BridgeConnector, Command, ConnectParams, SessionManager, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> sns_toolbox::Result<()> {
//!     sns_toolbox::logging::try_init().ok();
//!
//!     let manager = SessionManager::new(
//!         Arc::new(BridgeConnector::new("sns-bridge")),
//!         SessionOptions::default(),
//!     );
//!     let session = manager
//!         .connect(ConnectParams::new("10.0.0.254", 443, "admin", "secret"))
//!         .await?;
//!
//!     let output = session.send(&Command::new("system ident")).await?;
//!     println!("{}", output);
//!
//!     manager.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod monitor;
pub mod response;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use batch::{BatchEvent, BatchOutcome, BatchRunner, Command, CommandBatch, CommandResult};
pub use error::{Result, ToolboxError};
pub use export::{Decryptor, ExportCoordinator, ExportTask};
pub use monitor::{Monitor, MonitorEvent, MonitorQuery};
pub use session::{SessionHandle, SessionManager, SessionOptions, SessionState};
pub use transport::{BridgeConnector, ConnectParams, Connector, Transport};
