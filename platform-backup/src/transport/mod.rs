//! Transport collaborators: remote command execution, staged uploads and HTTP.
//!
//! The engine only hands command strings and byte streams to these traits.
//! Connection setup and teardown stay inside the implementations.

pub mod http;
pub mod local;
pub mod ssh;

use crate::{BackupError, Result};
use std::borrow::Cow;
use std::io::{Read, Write};
use std::path::Path;

pub use http::ReqwestGateway;
pub use local::{LocalExecutor, LocalStaging};
pub use ssh::{SshConfig, SshExecutor, SshRemoteOperations};

/// Runs a shell command and streams its stdout into `sink`.
pub trait RemoteExecutor {
    fn execute(&mut self, sink: &mut dyn Write, command: &str) -> Result<()>;
}

/// Stages a local stream on the execution target.
pub trait RemoteOperations {
    fn upload_file(&mut self, source: &mut dyn Read) -> Result<()>;

    /// Where the last upload landed on the target.
    fn path(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct RequestEntity {
    pub url: String,
    pub username: String,
    pub password: String,
    pub content_type: String,
}

pub struct HttpResponse {
    pub status: u16,
    /// `Location` header, set on redirects
    pub location: Option<String>,
    pub body: Box<dyn Read>,
}

impl HttpResponse {
    pub fn from_bytes(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            location: None,
            body: Box::new(std::io::Cursor::new(body.into())),
        }
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::from_bytes(status, Vec::new())
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(mut self) -> Result<String> {
        let mut text = String::new();
        self.body.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Turn a non-2xx response into [`BackupError::HttpStatus`] carrying the body.
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let body = self.text().unwrap_or_default();
        Err(BackupError::HttpStatus {
            url: url.to_string(),
            status,
            body,
        })
    }
}

pub trait HttpGateway {
    fn get(&self, request: &RequestEntity) -> Result<HttpResponse>;

    fn put(&self, request: &RequestEntity, body: Vec<u8>) -> Result<HttpResponse>;

    /// Multipart POST of a local file under `field_name`.
    fn upload(&self, request: &RequestEntity, field_name: &str, file: &Path) -> Result<HttpResponse>;
}

/// Quote a value for interpolation into a `sh` command line. Values made
/// only of characters the shell leaves alone are returned unchanged.
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-.,/:@%+=".contains(c));

    if plain {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
    }
}

/// Mask secrets passed on a command line before it is logged or reported.
/// A secret runs to the end of its shell word, quotes included.
pub fn redact(command: &str) -> String {
    const SECRET_PREFIXES: [&str; 2] = ["--password=", "PGPASSWORD="];

    let mut shown = String::with_capacity(command.len());
    let mut rest = command;

    while !rest.is_empty() {
        let word_start = rest.len() - rest.trim_start_matches(char::is_whitespace).len();
        shown.push_str(&rest[..word_start]);
        rest = &rest[word_start..];

        let (word, tail) = rest.split_at(shell_word_len(rest));
        match SECRET_PREFIXES.iter().find(|prefix| word.starts_with(*prefix)) {
            Some(prefix) => {
                shown.push_str(prefix);
                shown.push_str("****");
            }
            None => shown.push_str(word),
        }
        rest = tail;
    }

    shown
}

/// Byte length of the shell word at the start of `s`.
fn shell_word_len(s: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (None, '\\') | (Some('"'), '\\') => escaped = true,
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), c) if c == open => quote = None,
            (None, c) if c.is_whitespace() => return i,
            _ => {}
        }
    }

    s.len()
}
