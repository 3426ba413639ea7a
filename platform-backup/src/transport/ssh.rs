//! ssh2-backed command execution and SFTP staging.

use super::{redact, RemoteExecutor, RemoteOperations};
use crate::{BackupError, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

/// Bytes of remote stderr kept for the error report; the rest is discarded.
pub const STDERR_LIMIT: usize = 64 * 1024;

const IDLE_WAIT: Duration = Duration::from_millis(5);

#[derive(Clone)]
pub struct SshConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// PEM key; takes precedence over the password when set
    pub private_key: Option<String>,
}

impl std::fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConfig")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("private_key", &self.private_key.is_some())
            .finish()
    }
}

impl SshConfig {
    /// Open and authenticate a session.
    pub fn connect(&self) -> Result<ssh2::Session> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))?;
        let mut session = ssh2::Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;

        match &self.private_key {
            Some(key) => session.userauth_pubkey_memory(&self.username, None, key, None)?,
            None => session.userauth_password(&self.username, &self.password)?,
        }

        if !session.authenticated() {
            return Err(BackupError::Remote {
                command: format!("ssh {}@{}", self.username, self.host),
                reason: "authentication failed".to_string(),
            });
        }

        tracing::debug!(host = %self.host, user = %self.username, "SSH session established");
        Ok(session)
    }
}

pub struct SshExecutor {
    session: ssh2::Session,
}

impl SshExecutor {
    pub fn new(session: ssh2::Session) -> Self {
        Self { session }
    }

    pub fn connect(config: &SshConfig) -> Result<Self> {
        Ok(Self::new(config.connect()?))
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute(&mut self, sink: &mut dyn Write, command: &str) -> Result<()> {
        let shown = redact(command);
        tracing::debug!(command = %shown, "Executing remote command");

        let remote_error = |reason: String| BackupError::Remote {
            command: shown.clone(),
            reason,
        };

        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let stderr = {
            let _nonblocking = NonBlocking::enter(&self.session);
            let mut stdout = channel.stream(0);
            let mut stderr = channel.stderr();
            drain(&mut stdout, &mut stderr, sink).map_err(|e| remote_error(e.to_string()))?
        };
        channel.wait_close()?;

        match channel.exit_status()? {
            0 => Ok(()),
            status => Err(remote_error(format!(
                "exit status {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            ))),
        }
    }
}

/// Puts the session in non-blocking mode until dropped.
struct NonBlocking<'a>(&'a ssh2::Session);

impl<'a> NonBlocking<'a> {
    fn enter(session: &'a ssh2::Session) -> Self {
        session.set_blocking(false);
        Self(session)
    }
}

impl Drop for NonBlocking<'_> {
    fn drop(&mut self) {
        self.0.set_blocking(true);
    }
}

/// Copy `stdout` into `sink` while collecting `stderr`, reading whichever
/// has data so neither stream can fill the channel window and stall the
/// other. Returns at most [`STDERR_LIMIT`] bytes of stderr once both
/// streams reached end of file.
pub fn drain(stdout: &mut dyn Read, stderr: &mut dyn Read, sink: &mut dyn Write) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; 32 * 1024];
    let mut collected = Vec::new();
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        let mut progressed = false;

        if !out_done {
            match stdout.read(&mut buf) {
                Ok(0) => out_done = true,
                Ok(n) => {
                    sink.write_all(&buf[..n])?;
                    progressed = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        if !err_done {
            match stderr.read(&mut buf) {
                Ok(0) => err_done = true,
                Ok(n) => {
                    let room = STDERR_LIMIT.saturating_sub(collected.len());
                    collected.extend_from_slice(&buf[..n.min(room)]);
                    progressed = true;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        if !progressed && !(out_done && err_done) {
            std::thread::sleep(IDLE_WAIT);
        }
    }

    Ok(collected)
}

/// Stages uploads over SFTP at a unique path under `/tmp`.
pub struct SshRemoteOperations {
    session: ssh2::Session,
    path: String,
}

impl SshRemoteOperations {
    pub fn new(session: ssh2::Session) -> Self {
        Self {
            session,
            path: format!("/tmp/platform-backup-{}.backup", uuid::Uuid::new_v4()),
        }
    }
}

impl RemoteOperations for SshRemoteOperations {
    fn upload_file(&mut self, source: &mut dyn Read) -> Result<()> {
        let sftp = self.session.sftp()?;
        let mut remote_file = sftp.create(Path::new(&self.path))?;
        let bytes = std::io::copy(source, &mut remote_file)?;
        remote_file.flush()?;

        tracing::debug!(path = %self.path, bytes, "Uploaded file over SFTP");
        Ok(())
    }

    fn path(&self) -> &str {
        &self.path
    }
}
