//! Error taxonomy for the backup/restore engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("No credential found for identity '{identity}' on {product}/{job}")]
    NoCredentialFound {
        product: String,
        job: String,
        identity: String,
    },

    #[error("Invalid or incomplete component {component}: missing {missing}")]
    InvalidComponent { component: String, missing: String },

    #[error("No persistence components to back up or restore")]
    EmptyPersistenceList,

    #[error("Director credentials are invalid")]
    DirectorCredentialsInvalid,

    /// Generic classification for a failed dump or import. The underlying
    /// cause is logged where the failure happens.
    #[error("Database action failed for {component}")]
    DatabaseAction { component: String },

    #[error("Backup file not found: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Remote command `{command}` failed: {reason}")]
    Remote { command: String, reason: String },

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned status {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Director task {id} finished in state '{state}'")]
    DirectorTask { id: String, state: String },

    #[error("Encryption key not found in {}", .0.display())]
    EncryptionKeyNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
