//! Local command execution and local staging.

use super::{redact, RemoteExecutor, RemoteOperations};
use crate::{BackupError, Result};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Runs commands through `sh -c` on this machine.
#[derive(Debug, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl RemoteExecutor for LocalExecutor {
    fn execute(&mut self, sink: &mut dyn Write, command: &str) -> Result<()> {
        let shown = redact(command);
        tracing::debug!(command = %shown, "Executing local command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdout) = child.stdout.take() {
            std::io::copy(&mut stdout, sink)?;
        }

        let output = child.wait_with_output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BackupError::Remote {
                command: shown,
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

/// Stages uploads in a local file, for engines running on this machine.
#[derive(Debug)]
pub struct LocalStaging {
    path: PathBuf,
    display: String,
}

impl LocalStaging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let path = dir
            .into()
            .join(format!("platform-backup-{}.backup", uuid::Uuid::new_v4()));
        let display = path.to_string_lossy().to_string();
        Self { path, display }
    }
}

impl RemoteOperations for LocalStaging {
    fn upload_file(&mut self, source: &mut dyn Read) -> Result<()> {
        let mut file = std::fs::File::create(&self.path)?;
        std::io::copy(source, &mut file)?;
        file.flush()?;
        Ok(())
    }

    fn path(&self) -> &str {
        &self.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_executor_streams_stdout() {
        let mut out = Vec::new();
        LocalExecutor::new().execute(&mut out, "printf 'dump-bytes'").unwrap();
        assert_eq!(out, b"dump-bytes");
    }

    #[test]
    fn test_local_executor_reports_failure() {
        let err = LocalExecutor::new()
            .execute(&mut std::io::sink(), "echo oops >&2; exit 3")
            .unwrap_err();

        match err {
            BackupError::Remote { reason, .. } => assert!(reason.contains("oops")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_local_staging_writes_file() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let mut staging = LocalStaging::new(dir.path());
        staging.upload_file(&mut &b"archive"[..]).unwrap();

        assert!(staging.path().starts_with(&*dir.path().to_string_lossy()));
        assert_eq!(std::fs::read(staging.path())?, b"archive");
        Ok(())
    }
}
