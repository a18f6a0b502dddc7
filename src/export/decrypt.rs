//! Backup decryption through the external `decbackup` tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::DecryptError;

/// File name of the decrypt executable.
#[cfg(windows)]
pub const DECRYPT_TOOL_NAME: &str = "decbackup.exe";

/// File name of the decrypt executable.
#[cfg(not(windows))]
pub const DECRYPT_TOOL_NAME: &str = "decbackup";

/// Exit status and diagnostics of one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// Runs an external program with a single path argument.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &Path, argument: &Path) -> std::io::Result<ToolOutput>;
}

/// Runs the tool as a child process, inside the source file's directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, program: &Path, argument: &Path) -> std::io::Result<ToolOutput> {
        let mut cmd = Command::new(program);
        cmd.arg(argument)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = argument.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Where decrypted files end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptOutcome {
    pub source: PathBuf,
    pub output_dir: PathBuf,
}

/// Locates and invokes the decrypt tool.
#[derive(Clone)]
pub struct Decryptor {
    tool_dir: PathBuf,
    runner: Arc<dyn ToolRunner>,
}

impl Decryptor {
    /// Look for the tool in `tool_dir`.
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            runner: Arc::new(ProcessRunner),
        }
    }

    /// Look for the tool next to the running executable.
    pub fn beside_executable() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(dir))
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn tool_path(&self) -> PathBuf {
        self.tool_dir.join(DECRYPT_TOOL_NAME)
    }

    /// Decrypt `source`; output files are written beside it by the tool.
    ///
    /// A relative `source` is resolved against the current directory
    /// before the tool starts in the source's directory.
    pub async fn decrypt(&self, source: &Path) -> Result<DecryptOutcome, DecryptError> {
        let tool = self.tool_path();
        if !tool.is_file() {
            return Err(DecryptError::ToolMissing(tool));
        }
        validate_source(source)?;

        let source = absolute(source).map_err(|e| DecryptError::InvalidFile {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        let output_dir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        info!(source = %source.display(), tool = %tool.display(), "decrypting backup");
        let output = self
            .runner
            .run(&tool, &source)
            .await
            .map_err(|e| DecryptError::ToolFailed {
                code: None,
                stderr: e.to_string(),
            })?;

        if output.success {
            debug!(output_dir = %output_dir.display(), "decryption complete");
            Ok(DecryptOutcome { source, output_dir })
        } else {
            warn!(code = ?output.exit_code, "decrypt tool failed: {}", output.stderr);
            Err(DecryptError::ToolFailed {
                code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn validate_source(source: &Path) -> Result<(), DecryptError> {
    let invalid = |reason: &str| DecryptError::InvalidFile {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    };

    let metadata = std::fs::metadata(source).map_err(|e| invalid(&e.to_string()))?;
    if !metadata.is_file() {
        return Err(invalid("not a regular file"));
    }
    if metadata.len() == 0 {
        return Err(invalid("file is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_path() {
        let decryptor = Decryptor::new("/opt/toolbox");
        assert_eq!(decryptor.tool_path(), Path::new("/opt/toolbox").join(DECRYPT_TOOL_NAME));
    }

    #[test]
    fn test_beside_executable() {
        let decryptor = Decryptor::beside_executable().unwrap();
        let exe_dir = std::env::current_exe().unwrap();
        assert_eq!(decryptor.tool_path().parent(), exe_dir.parent());
    }

    #[test]
    fn test_validate_missing_source() {
        let err = validate_source(Path::new("/nonexistent/backup.na")).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidFile { .. }));
    }

    #[test]
    fn test_validate_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_source(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        let path = Path::new("/var/backups/fw.na");
        assert_eq!(absolute(path).unwrap(), path);
        assert!(absolute(Path::new("backups/fw.na")).unwrap().is_absolute());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Install a shell script named like the decrypt tool.
        fn install_tool(dir: &Path, body: &str) {
            let path = dir.join(DECRYPT_TOOL_NAME);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        #[tokio::test]
        async fn test_relative_source_reaches_tool() {
            let tools = tempfile::tempdir().unwrap();
            install_tool(
                tools.path(),
                r#"[ -f "$1" ] || { echo "cannot open $1 from $(pwd)" >&2; exit 3; }
echo decrypted > "$(basename "$1").tgz""#,
            );

            // Relative to the test's working directory.
            let work = tempfile::tempdir_in(".").unwrap();
            let relative = Path::new(".")
                .join(work.path().file_name().unwrap())
                .join("backup.na");
            std::fs::write(&relative, b"encrypted").unwrap();

            let outcome = Decryptor::new(tools.path()).decrypt(&relative).await.unwrap();

            assert!(outcome.source.is_absolute());
            assert!(outcome.output_dir.join("backup.na.tgz").is_file());
        }

        #[tokio::test]
        async fn test_tool_exit_code_and_stderr() {
            let tools = tempfile::tempdir().unwrap();
            install_tool(tools.path(), "echo 'wrong password' >&2\nexit 4");
            let work = tempfile::tempdir().unwrap();
            let source = work.path().join("backup.na");
            std::fs::write(&source, b"encrypted").unwrap();

            match Decryptor::new(tools.path()).decrypt(&source).await {
                Err(DecryptError::ToolFailed { code, stderr }) => {
                    assert_eq!(code, Some(4));
                    assert_eq!(stderr, "wrong password");
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }
}
