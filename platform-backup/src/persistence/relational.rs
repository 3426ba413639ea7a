//! Relational engines (PostgreSQL, MySQL) driven by command templates.
//!
//! Placeholders: `{bin}`, `{user}`, `{host}`, `{password}`, `{port}`,
//! `{database}`, `{connect}` and `{path}` (the staged upload). Substituted
//! values are shell-quoted.

use super::{EngineKind, PersistenceBackup};
use crate::config::ToolPaths;
use crate::transport::{shell_quote, LocalExecutor, LocalStaging, RemoteExecutor, RemoteOperations};
use crate::Result;
use std::io::{Read, Write};

/// Format templates for one engine.
#[derive(Debug)]
pub struct CommandTemplates {
    pub connect: &'static str,
    pub dump: &'static str,
    pub restore: &'static str,
    pub flush: &'static str,
}

pub const POSTGRES_TEMPLATES: CommandTemplates = CommandTemplates {
    connect: "PGPASSWORD={password} {bin} -h {host} -U {user} -p {port}",
    dump: "{connect} -Fc {database}",
    restore: "{connect} -c -d {database} {path}",
    flush: "{connect} -d {database} -c 'ANALYZE'",
};

pub const MYSQL_TEMPLATES: CommandTemplates = CommandTemplates {
    connect: "{bin} -u {user} -h {host} --password={password}",
    dump: "{connect} --all-databases",
    restore: "{connect} < {path}",
    flush: "{connect} -e 'FLUSH PRIVILEGES'",
};

/// Engine-specific binaries and connection parameters bound at construction.
#[derive(Debug, Clone)]
pub struct RelationalEngine {
    kind: EngineKind,
    templates: &'static CommandTemplates,
    dump_bin: String,
    restore_bin: String,
    client_bin: String,
    port: Option<u16>,
    database: Option<String>,
}

impl RelationalEngine {
    pub fn postgres(tools: &ToolPaths, port: u16, database: &str) -> Self {
        Self {
            kind: EngineKind::Postgres,
            templates: &POSTGRES_TEMPLATES,
            dump_bin: tools.pg_dump.clone(),
            restore_bin: tools.pg_restore.clone(),
            client_bin: tools.psql.clone(),
            port: Some(port),
            database: Some(database.to_string()),
        }
    }

    pub fn mysql(tools: &ToolPaths) -> Self {
        Self {
            kind: EngineKind::Mysql,
            templates: &MYSQL_TEMPLATES,
            dump_bin: tools.mysqldump.clone(),
            restore_bin: tools.mysql.clone(),
            client_bin: tools.mysql.clone(),
            port: None,
            database: None,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn dump_bin(&self) -> &str {
        &self.dump_bin
    }

    pub fn restore_bin(&self) -> &str {
        &self.restore_bin
    }
}

pub struct RelationalDump {
    engine: RelationalEngine,
    host: String,
    username: String,
    password: String,
    caller: Box<dyn RemoteExecutor>,
    remote_ops: Box<dyn RemoteOperations>,
}

impl RelationalDump {
    pub fn new(
        engine: RelationalEngine,
        host: &str,
        username: &str,
        password: &str,
        caller: Box<dyn RemoteExecutor>,
        remote_ops: Box<dyn RemoteOperations>,
    ) -> Self {
        Self {
            engine,
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            caller,
            remote_ops,
        }
    }

    /// MySQL reachable from this machine; uploads are staged in the temp dir.
    pub fn local_mysql(tools: &ToolPaths, host: &str, username: &str, password: &str) -> Self {
        Self::new(
            RelationalEngine::mysql(tools),
            host,
            username,
            password,
            Box::new(LocalExecutor::new()),
            Box::new(LocalStaging::new(std::env::temp_dir())),
        )
    }

    pub fn engine(&self) -> &RelationalEngine {
        &self.engine
    }

    fn render(&self, template: &str, bin: &str) -> String {
        let connect = self.connect_command(bin);
        // connect goes in last so credentials are never rescanned
        template
            .replace(
                "{database}",
                &shell_quote(self.engine.database.as_deref().unwrap_or_default()),
            )
            .replace("{path}", &shell_quote(self.remote_ops.path()))
            .replace("{connect}", &connect)
    }

    fn connect_command(&self, bin: &str) -> String {
        self.engine
            .templates
            .connect
            .replace("{bin}", bin)
            .replace("{user}", &shell_quote(&self.username))
            .replace("{host}", &shell_quote(&self.host))
            .replace(
                "{port}",
                &self.engine.port.map(|p| p.to_string()).unwrap_or_default(),
            )
            .replace("{password}", &shell_quote(&self.password))
    }

    pub fn dump_command(&self) -> String {
        self.render(self.engine.templates.dump, &self.engine.dump_bin)
    }

    pub fn restore_command(&self) -> String {
        self.render(self.engine.templates.restore, &self.engine.restore_bin)
    }

    pub fn flush_command(&self) -> String {
        self.render(self.engine.templates.flush, &self.engine.client_bin)
    }
}

impl PersistenceBackup for RelationalDump {
    fn dump(&mut self, dest: &mut dyn Write) -> Result<()> {
        let command = self.dump_command();
        self.caller.execute(dest, &command)?;
        tracing::debug!(engine = ?self.engine.kind, "Dump finished");
        Ok(())
    }

    fn import(&mut self, source: &mut dyn Read) -> Result<()> {
        self.remote_ops.upload_file(source)?;

        for command in [self.restore_command(), self.flush_command()] {
            self.caller.execute(&mut std::io::sink(), &command)?;
        }

        tracing::debug!(engine = ?self.engine.kind, "Import finished");
        Ok(())
    }
}
