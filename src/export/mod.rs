//! Configuration backups, system information dumps and backup decryption.

mod coordinator;
mod decrypt;

pub use coordinator::{
    system_info_file_name, ExportCoordinator, ExportKind, ExportState, ExportTask,
    BACKUP_COMMAND, SYSTEM_IDENT_COMMAND, SYSTEM_INFO_COMMAND,
};
pub use decrypt::{
    DecryptOutcome, Decryptor, ProcessRunner, ToolOutput, ToolRunner, DECRYPT_TOOL_NAME,
};
