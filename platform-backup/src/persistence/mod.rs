//! Uniform dump/import contract over the platform's persistence engines.
//!
//! Each engine translates `dump`/`import` into its native remote command
//! sequence. The bytes written by `dump` are exactly what `import` of the
//! same engine expects; nothing in between transforms them.

pub mod nfs;
pub mod relational;

use crate::config::ToolPaths;
use crate::manifest::ComponentSpec;
use crate::transport::{SshConfig, SshExecutor, SshRemoteOperations};
use crate::{BackupError, Result};
use std::io::{Read, Write};

pub use nfs::NfsBackup;
pub use relational::{RelationalDump, RelationalEngine};

pub trait PersistenceBackup {
    /// Stream an engine-native export into `dest`.
    fn dump(&mut self, dest: &mut dyn Write) -> Result<()>;

    /// Restore the engine from a stream previously produced by `dump`.
    fn import(&mut self, source: &mut dyn Read) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Postgres,
    Mysql,
    Nfs,
}

impl EngineKind {
    pub fn is_relational(self) -> bool {
        matches!(self, EngineKind::Postgres | EngineKind::Mysql)
    }
}

/// Resolved connection data for one persistence component.
#[derive(Clone)]
pub struct ComponentDump {
    pub kind: EngineKind,
    pub product: String,
    pub component: String,
    pub identity: String,
    pub database: Option<String>,
    pub ip: String,
    pub user: String,
    pub pass: String,
    pub system_user: String,
    pub system_pass: String,
    pub ssh_private_key: Option<String>,
}

impl std::fmt::Debug for ComponentDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDump")
            .field("kind", &self.kind)
            .field("product", &self.product)
            .field("component", &self.component)
            .field("identity", &self.identity)
            .field("ip", &self.ip)
            .field("user", &self.user)
            .field("system_user", &self.system_user)
            .finish_non_exhaustive()
    }
}

impl ComponentDump {
    /// An unresolved component; the resolver fills in IP and credentials.
    pub fn new(spec: &ComponentSpec) -> Self {
        Self {
            kind: spec.kind,
            product: spec.product.clone(),
            component: spec.component.clone(),
            identity: spec.identity.clone(),
            database: spec.database.clone(),
            ip: String::new(),
            user: String::new(),
            pass: String::new(),
            system_user: String::new(),
            system_pass: String::new(),
            ssh_private_key: None,
        }
    }

    /// All eight identifying and credential fields must be set.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("product", &self.product),
            ("component", &self.component),
            ("identity", &self.identity),
            ("ip", &self.ip),
            ("user", &self.user),
            ("pass", &self.pass),
            ("system_user", &self.system_user),
            ("system_pass", &self.system_pass),
        ];

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BackupError::InvalidComponent {
                component: self.component.clone(),
                missing: missing.join(", "),
            })
        }
    }

    fn ssh_config(&self, port: u16) -> SshConfig {
        SshConfig {
            username: self.system_user.clone(),
            password: self.system_pass.clone(),
            host: self.ip.clone(),
            port,
            private_key: self.ssh_private_key.clone(),
        }
    }
}

/// Builds the adapter matching a component's engine.
pub trait AdapterFactory {
    fn adapter_for(&self, component: &ComponentDump) -> Result<Box<dyn PersistenceBackup>>;
}

/// Production factory: every adapter talks to its VM over SSH.
#[derive(Debug, Clone)]
pub struct SshAdapterFactory {
    tools: ToolPaths,
    ssh_port: u16,
}

impl SshAdapterFactory {
    pub fn new(tools: ToolPaths, ssh_port: u16) -> Self {
        Self { tools, ssh_port }
    }
}

/// Postgres listens on this port on the platform's database VMs.
const POSTGRES_PORT: u16 = 2544;

impl AdapterFactory for SshAdapterFactory {
    fn adapter_for(&self, component: &ComponentDump) -> Result<Box<dyn PersistenceBackup>> {
        let session = component.ssh_config(self.ssh_port).connect()?;
        let executor = Box::new(SshExecutor::new(session.clone()));
        let staging = Box::new(SshRemoteOperations::new(session));

        let adapter: Box<dyn PersistenceBackup> = match component.kind {
            EngineKind::Postgres => Box::new(RelationalDump::new(
                RelationalEngine::postgres(
                    &self.tools,
                    POSTGRES_PORT,
                    component.database.as_deref().unwrap_or(&component.component),
                ),
                "localhost",
                &component.user,
                &component.pass,
                executor,
                staging,
            )),
            EngineKind::Mysql => Box::new(RelationalDump::new(
                RelationalEngine::mysql(&self.tools),
                "localhost",
                &component.user,
                &component.pass,
                executor,
                staging,
            )),
            EngineKind::Nfs => Box::new(NfsBackup::new(executor, staging)),
        };

        Ok(adapter)
    }
}
