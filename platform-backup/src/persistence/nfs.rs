//! Shared-filesystem store: a gzipped tar of the blobstore directory.

use super::PersistenceBackup;
use crate::transport::{shell_quote, RemoteExecutor, RemoteOperations};
use crate::Result;
use std::io::{Read, Write};

/// Where the store lives on the NFS server VM
pub const NFS_DIR_PATH: &str = "/var/vcap/store";

/// Directory archived under [`NFS_DIR_PATH`]
pub const NFS_ARCHIVE_DIR: &str = "shared";

pub struct NfsBackup {
    caller: Box<dyn RemoteExecutor>,
    remote_ops: Box<dyn RemoteOperations>,
}

impl NfsBackup {
    pub fn new(caller: Box<dyn RemoteExecutor>, remote_ops: Box<dyn RemoteOperations>) -> Self {
        Self { caller, remote_ops }
    }

    pub fn dump_command(&self) -> String {
        format!("cd {NFS_DIR_PATH} && tar cz {NFS_ARCHIVE_DIR}")
    }

    pub fn restore_command(&self) -> String {
        format!("cd {NFS_DIR_PATH} && tar zxf {}", shell_quote(self.remote_ops.path()))
    }
}

impl PersistenceBackup for NfsBackup {
    fn dump(&mut self, dest: &mut dyn Write) -> Result<()> {
        let command = self.dump_command();
        self.caller.execute(dest, &command)
    }

    fn import(&mut self, source: &mut dyn Read) -> Result<()> {
        self.remote_ops.upload_file(source)?;
        let command = self.restore_command();
        self.caller.execute(&mut std::io::sink(), &command)
    }
}
