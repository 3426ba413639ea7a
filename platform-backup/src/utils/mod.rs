//! Utility modules shared by the engine and the binary.

pub mod errors;
pub mod logger;

pub use errors::{BackupError, Result};
