//! Export and decrypt integration tests.

mod common;

use std::sync::Arc;

use common::{connected_session, FakeAppliance, RecordingRunner};
use sns_toolbox::error::{DecryptError, ExportError};
use sns_toolbox::export::{
    ExportKind, ExportState, BACKUP_COMMAND, DECRYPT_TOOL_NAME, SYSTEM_IDENT_COMMAND,
    SYSTEM_INFO_COMMAND,
};
use sns_toolbox::{Decryptor, ExportCoordinator};
use tempfile::TempDir;

const ACQUIRE: &str = "system right ticket acquire";
const RELEASE: &str = "system right ticket release";

/// Decryptor whose tool directory optionally contains the tool.
fn decryptor(with_tool: bool, runner: &RecordingRunner) -> (TempDir, Decryptor) {
    let dir = tempfile::tempdir().unwrap();
    if with_tool {
        std::fs::write(dir.path().join(DECRYPT_TOOL_NAME), b"#!/bin/sh\n").unwrap();
    }
    let decryptor = Decryptor::new(dir.path()).with_runner(Arc::new(runner.clone()));
    (dir, decryptor)
}

async fn coordinator(appliance: &FakeAppliance) -> ExportCoordinator {
    let session = connected_session(appliance).await;
    let (_dir, decryptor) = decryptor(false, &RecordingRunner::succeeding());
    ExportCoordinator::new(session, decryptor)
}

// ============================================================================
// Backup Tests
// ============================================================================

#[tokio::test]
async fn test_backup_written_verbatim() {
    let payload = b"\x1f\x8b\x08binary-backup\x00\xff";
    let appliance = FakeAppliance::new();
    appliance.serve_download(BACKUP_COMMAND, payload);
    let exports = coordinator(&appliance).await;

    let out = tempfile::tempdir().unwrap();
    let destination = out.path().join("fw.na");
    let task = exports.export_backup(&destination).await.unwrap();

    assert_eq!(task.kind, ExportKind::ConfigBackup);
    assert_eq!(task.state, ExportState::Succeeded);
    assert_eq!(task.bytes_written, payload.len());
    assert_eq!(std::fs::read(&destination).unwrap(), payload);
}

#[tokio::test]
async fn test_backup_unwritable_destination() {
    let appliance = FakeAppliance::new();
    let exports = coordinator(&appliance).await;

    let out = tempfile::tempdir().unwrap();
    let destination = out.path().join("missing").join("fw.na");
    let err = exports.export_backup(&destination).await.unwrap_err();
    assert!(matches!(err, ExportError::Write { .. }));
}

#[tokio::test]
async fn test_backup_download_failure() {
    let appliance = FakeAppliance::new();
    appliance.break_on(BACKUP_COMMAND);
    let exports = coordinator(&appliance).await;

    let out = tempfile::tempdir().unwrap();
    let destination = out.path().join("fw.na");
    let err = exports.export_backup(&destination).await.unwrap_err();

    assert!(matches!(err, ExportError::Command(_)));
    assert!(!destination.exists());
}

// ============================================================================
// System Information Tests
// ============================================================================

#[tokio::test]
async fn test_system_info_acquires_and_releases_rights() {
    let appliance = FakeAppliance::new();
    appliance.serve_download(SYSTEM_INFO_COMMAND, b"[Info]\nModel=SN310");
    let exports = coordinator(&appliance).await;
    appliance.clear_sent();

    let out = tempfile::tempdir().unwrap();
    let destination = out.path().join("system_info_fw");
    let task = exports.export_system_info(&destination).await.unwrap();

    assert_eq!(task.kind, ExportKind::SystemInfo);
    assert_eq!(
        appliance.sent(),
        vec![ACQUIRE, SYSTEM_INFO_COMMAND, RELEASE]
    );
    assert_eq!(std::fs::read(&destination).unwrap(), b"[Info]\nModel=SN310");
}

#[tokio::test]
async fn test_system_info_releases_rights_on_failure() {
    let appliance = FakeAppliance::new();
    appliance.break_on(SYSTEM_INFO_COMMAND);
    let exports = coordinator(&appliance).await;
    appliance.clear_sent();

    let out = tempfile::tempdir().unwrap();
    let result = exports
        .export_system_info(&out.path().join("system_info_fw"))
        .await;

    assert!(result.is_err());
    assert_eq!(appliance.sent().last().map(String::as_str), Some(RELEASE));
}

#[tokio::test]
async fn test_system_info_without_rights() {
    let appliance = FakeAppliance::new();
    appliance.fail_on(ACQUIRE);
    let exports = coordinator(&appliance).await;
    appliance.clear_sent();

    let out = tempfile::tempdir().unwrap();
    let err = exports
        .export_system_info(&out.path().join("system_info_fw"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::Command(_)));
    assert_eq!(appliance.sent(), vec![ACQUIRE]);
}

#[tokio::test]
async fn test_system_name() {
    let appliance = FakeAppliance::new();
    appliance.respond(SYSTEM_IDENT_COMMAND, "[Result]\nSystemName=\"fw-paris\"\nModel=SN510");
    let exports = coordinator(&appliance).await;

    assert_eq!(exports.system_name().await.unwrap(), "fw-paris");
}

#[tokio::test]
async fn test_system_name_missing() {
    let appliance = FakeAppliance::new();
    appliance.respond(SYSTEM_IDENT_COMMAND, "[Result]\nModel=SN510");
    let exports = coordinator(&appliance).await;

    assert!(matches!(
        exports.system_name().await,
        Err(ExportError::MissingSystemName)
    ));
}

// ============================================================================
// Decrypt Tests
// ============================================================================

#[tokio::test]
async fn test_decrypt_tool_missing_spawns_nothing() {
    let runner = RecordingRunner::succeeding();
    let (_tools, decryptor) = decryptor(false, &runner);
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("backup.na");
    std::fs::write(&source, b"encrypted").unwrap();

    let err = decryptor.decrypt(&source).await.unwrap_err();
    assert!(matches!(err, DecryptError::ToolMissing(_)));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_decrypt_tool_missing_checked_before_source() {
    let runner = RecordingRunner::succeeding();
    let (_tools, decryptor) = decryptor(false, &runner);

    let err = decryptor
        .decrypt(std::path::Path::new("/nonexistent/backup.na"))
        .await
        .unwrap_err();
    assert!(matches!(err, DecryptError::ToolMissing(_)));
}

#[tokio::test]
async fn test_decrypt_passes_source_as_sole_argument() {
    let runner = RecordingRunner::succeeding();
    let (tools, decryptor) = decryptor(true, &runner);
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("backup.na");
    std::fs::write(&source, b"encrypted").unwrap();

    let outcome = decryptor.decrypt(&source).await.unwrap();

    assert_eq!(outcome.output_dir, work.path());
    assert_eq!(
        runner.calls(),
        vec![(tools.path().join(DECRYPT_TOOL_NAME), source.clone())]
    );
}

#[tokio::test]
async fn test_decrypt_tool_failure() {
    let runner = RecordingRunner::failing(3, "bad password");
    let (_tools, decryptor) = decryptor(true, &runner);
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("backup.na");
    std::fs::write(&source, b"encrypted").unwrap();

    match decryptor.decrypt(&source).await {
        Err(DecryptError::ToolFailed { code, stderr }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "bad password");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_decrypt_rejects_empty_source() {
    let runner = RecordingRunner::succeeding();
    let (_tools, decryptor) = decryptor(true, &runner);
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("backup.na");
    std::fs::write(&source, b"").unwrap();

    let err = decryptor.decrypt(&source).await.unwrap_err();
    assert!(matches!(err, DecryptError::InvalidFile { .. }));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_coordinator_decrypts_through_decryptor() {
    let appliance = FakeAppliance::new();
    let session = connected_session(&appliance).await;
    let runner = RecordingRunner::succeeding();
    let (_tools, decryptor) = decryptor(true, &runner);
    let exports = ExportCoordinator::new(session, decryptor);

    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("backup.na");
    std::fs::write(&source, b"encrypted").unwrap();

    exports.decrypt_backup(&source).await.unwrap();
    assert_eq!(runner.calls().len(), 1);
}
