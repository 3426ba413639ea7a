//! Platform Backup Library
//!
//! Backup and restore orchestration for a multi-component platform
//! deployment: the Ops Manager installation, the runtime's databases and
//! its shared filesystem, sequenced through a fail-fast tile pipeline.

pub mod config;
pub mod director;
pub mod lifecycle;
pub mod manifest;
pub mod persistence;
pub mod pipeline;
pub mod tile;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, ConnectionBucket, PipelineConfig};
pub use pipeline::{run_backup_pipeline, run_pipeline, run_restore_pipeline};
pub use utils::errors::{BackupError, Result};
