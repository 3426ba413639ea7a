//! Configuration for backup/restore runs.
//!
//! Loads the optional TOML file used by the binary and carries the
//! release-dependent settings (vendored tool paths, BOSH product name)
//! that adapters receive at construction time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that selects the platform release.
pub const RELEASE_ENV_FLAG: &str = "ER_VERSION";

/// Toggle value selecting the 1.6 release layout.
pub const RELEASE_1_6: &str = "1.6";

/// Platform release generation. Decides which vendored database tools are
/// used and under which product name the director is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReleaseVersion {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "1.6")]
    V1_6,
}

impl ReleaseVersion {
    /// Read the release toggle from `ER_VERSION`. Absence selects the default.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(RELEASE_ENV_FLAG).ok().as_deref())
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(RELEASE_1_6) => ReleaseVersion::V1_6,
            _ => ReleaseVersion::Default,
        }
    }

    /// Product identifier of the director in the installation manifest.
    pub fn bosh_product_name(self) -> &'static str {
        match self {
            ReleaseVersion::V1_6 => "p-bosh",
            ReleaseVersion::Default => "microbosh",
        }
    }
}

/// Vendored database tool binaries on the platform VMs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub pg_dump: String,
    pub pg_restore: String,
    pub psql: String,
    pub mysqldump: String,
    pub mysql: String,
}

impl ToolPaths {
    pub fn for_release(release: ReleaseVersion) -> Self {
        let pg_dir = match release {
            ReleaseVersion::V1_6 => "/var/vcap/packages/postgres-9.4.2/bin",
            ReleaseVersion::Default => "/var/vcap/packages/postgres/bin",
        };
        let mysql_dir = "/var/vcap/packages/mariadb/bin";

        Self {
            pg_dump: format!("{pg_dir}/pg_dump"),
            pg_restore: format!("{pg_dir}/pg_restore"),
            psql: format!("{pg_dir}/psql"),
            mysqldump: format!("{mysql_dir}/mysqldump"),
            mysql: format!("{mysql_dir}/mysql"),
        }
    }
}

/// How a failure to stop dependent jobs before a dump is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Log the failure and continue with the dump.
    #[default]
    BestEffort,
    /// Abort the tile action (dependents are still restarted).
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Explicit release; `None` defers to the `ER_VERSION` toggle
    pub release: Option<ReleaseVersion>,

    pub stop_policy: StopPolicy,

    /// SSH port of the platform VMs
    pub ssh_port: u16,

    /// Director API port
    pub director_port: u16,

    /// Seconds between director task polls
    pub task_poll_interval_secs: u64,

    /// Maximum number of director task polls
    pub task_poll_attempts: u32,

    /// Accept self-signed certificates on the Ops Manager and director APIs
    pub accept_invalid_certs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            release: None,
            stop_policy: StopPolicy::default(),
            ssh_port: 22,
            director_port: 25555,
            task_poll_interval_secs: 2,
            task_poll_attempts: 150,
            accept_invalid_certs: true,
        }
    }
}

impl PipelineConfig {
    pub fn resolved_release(&self) -> ReleaseVersion {
        self.release.unwrap_or_else(ReleaseVersion::from_env)
    }

    /// Fix the release for the rest of the run, reading `ER_VERSION`
    /// only when no release was configured.
    pub fn pinned(mut self) -> Self {
        self.release = Some(self.resolved_release());
        self
    }

    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths::for_release(self.resolved_release())
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_secs(self.task_poll_interval_secs)
    }
}

/// Connection parameters for one pipeline run. Read-only once built.
#[derive(Debug, Clone)]
pub struct ConnectionBucket {
    hostname: String,
    admin_username: String,
    admin_password: String,
    opsmanager_username: String,
    opsmanager_password: String,
    destination: PathBuf,
}

impl ConnectionBucket {
    pub fn new(
        hostname: impl Into<String>,
        admin_username: impl Into<String>,
        admin_password: impl Into<String>,
        opsmanager_username: impl Into<String>,
        opsmanager_password: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            admin_username: admin_username.into(),
            admin_password: admin_password.into(),
            opsmanager_username: opsmanager_username.into(),
            opsmanager_password: opsmanager_password.into(),
            destination: destination.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }

    pub fn opsmanager_username(&self) -> &str {
        &self.opsmanager_username
    }

    pub fn opsmanager_password(&self) -> &str {
        &self.opsmanager_password
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// File configuration of the binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
