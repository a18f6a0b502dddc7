//! One-shot exports from the appliance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::decrypt::{DecryptOutcome, Decryptor};
use crate::batch::Command;
use crate::error::{DecryptError, ExportError};
use crate::response::find_value;
use crate::session::SessionHandle;

/// Full configuration backup.
pub const BACKUP_COMMAND: &str = "config backup list=all";

/// Diagnostic dump; requires the rights ticket.
pub const SYSTEM_INFO_COMMAND: &str = "system information";

/// Appliance identity, carries `SystemName=`.
pub const SYSTEM_IDENT_COMMAND: &str = "system ident";

/// Which payload an export retrieves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    ConfigBackup,
    SystemInfo,
}

/// Progress of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One export and where its payload went.
#[derive(Debug, Clone)]
pub struct ExportTask {
    pub kind: ExportKind,
    pub destination: PathBuf,
    pub state: ExportState,
    pub bytes_written: usize,
}

impl ExportTask {
    fn new(kind: ExportKind, destination: &Path) -> Self {
        Self {
            kind,
            destination: destination.to_path_buf(),
            state: ExportState::Pending,
            bytes_written: 0,
        }
    }
}

/// Default file name for a system information dump.
pub fn system_info_file_name(system_name: &str) -> String {
    format!("system_info_{}", system_name)
}

/// Runs exports through a session and decrypts backups.
pub struct ExportCoordinator {
    session: Arc<SessionHandle>,
    decryptor: Decryptor,
}

impl ExportCoordinator {
    pub fn new(session: Arc<SessionHandle>, decryptor: Decryptor) -> Self {
        Self { session, decryptor }
    }

    /// Download a fresh configuration backup into `destination`.
    pub async fn export_backup(&self, destination: &Path) -> Result<ExportTask, ExportError> {
        let mut task = ExportTask::new(ExportKind::ConfigBackup, destination);
        task.state = ExportState::Running;
        info!(destination = %destination.display(), "exporting configuration backup");

        let result = self.fetch_and_write(BACKUP_COMMAND, destination).await;
        finish(task, result)
    }

    /// Download the system information dump into `destination`.
    ///
    /// The rights ticket is acquired for the download and released
    /// afterwards, also when the download fails.
    pub async fn export_system_info(&self, destination: &Path) -> Result<ExportTask, ExportError> {
        let mut task = ExportTask::new(ExportKind::SystemInfo, destination);
        task.state = ExportState::Running;
        info!(destination = %destination.display(), "exporting system information");

        if let Err(e) = self.session.acquire_rights().await {
            return finish(task, Err(e.into()));
        }
        let result = self.fetch_and_write(SYSTEM_INFO_COMMAND, destination).await;
        if let Err(e) = self.session.release_rights().await {
            warn!("rights ticket not released: {}", e);
        }
        finish(task, result)
    }

    /// Read the appliance system name from `system ident`.
    pub async fn system_name(&self) -> Result<String, ExportError> {
        let output = self
            .session
            .send(&Command::new(SYSTEM_IDENT_COMMAND))
            .await?;
        find_value(&output, "SystemName")
            .map(str::to_string)
            .ok_or(ExportError::MissingSystemName)
    }

    /// Decrypt a downloaded backup with the external tool.
    pub async fn decrypt_backup(&self, source: &Path) -> Result<DecryptOutcome, DecryptError> {
        self.decryptor.decrypt(source).await
    }

    async fn fetch_and_write(
        &self,
        command: &str,
        destination: &Path,
    ) -> Result<usize, ExportError> {
        let payload = self.session.download(&Command::new(command)).await?;
        tokio::fs::write(destination, &payload)
            .await
            .map_err(|source| ExportError::Write {
                path: destination.to_path_buf(),
                source,
            })?;
        Ok(payload.len())
    }
}

fn finish(
    mut task: ExportTask,
    result: Result<usize, ExportError>,
) -> Result<ExportTask, ExportError> {
    match result {
        Ok(bytes) => {
            task.state = ExportState::Succeeded;
            task.bytes_written = bytes;
            info!(kind = ?task.kind, bytes, "export complete");
            Ok(task)
        }
        Err(e) => {
            task.state = ExportState::Failed;
            warn!(
                kind = ?task.kind,
                destination = %task.destination.display(),
                "export failed: {}",
                e
            );
            Err(e)
        }
    }
}
