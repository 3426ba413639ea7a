//! Ops Manager tile: deployments archive, encryption key and installation export.
//!
//! Backup layout under `<destination>/opsmanager/`:
//!
//! - `deployments.tar.gz` and its extracted `deployments/` directory
//! - `cc_db_encryption_key.txt`
//! - `installation.json` (installation settings, read later by the runtime tile)
//! - `installation.zip` (asset collection, the only file restore uploads)

use super::Tile;
use crate::config::{ConnectionBucket, PipelineConfig};
use crate::transport::{
    shell_quote, HttpGateway, LocalExecutor, RemoteExecutor, RequestEntity, SshConfig,
    SshExecutor,
};
use crate::{BackupError, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const OPSMGR_BACKUP_DIR: &str = "opsmanager";
pub const OPSMGR_INSTALLATION_SETTINGS_FILENAME: &str = "installation.json";
pub const OPSMGR_INSTALLATION_ASSETS_FILENAME: &str = "installation.zip";
pub const OPSMGR_INSTALLATION_ASSETS_POSTFIELD_NAME: &str = "installation[file]";
pub const OPSMGR_DEPLOYMENTS_FILENAME: &str = "deployments.tar.gz";
pub const OPSMGR_DEPLOYMENTS_DIR: &str = "deployments";
pub const OPSMGR_ENCRYPTIONKEY_FILENAME: &str = "cc_db_encryption_key.txt";
pub const OPSMGR_DEPLOYMENTS_FILE: &str =
    "/var/tempest/workspaces/default/deployments/bosh-deployments.yml";

const DEPLOYMENTS_FILE_NAME: &str = "bosh-deployments.yml";
const ENCRYPTION_KEY_FIELD: &str = "db_encryption_key";

/// Path of the exported installation settings inside a backup destination.
pub fn installation_settings_path(destination: &Path) -> PathBuf {
    destination
        .join(OPSMGR_BACKUP_DIR)
        .join(OPSMGR_INSTALLATION_SETTINGS_FILENAME)
}

pub struct OpsManager {
    hostname: String,
    username: String,
    password: String,
    backup_dir: PathBuf,
    executor: Box<dyn RemoteExecutor>,
    local_executor: Box<dyn RemoteExecutor>,
    gateway: Arc<dyn HttpGateway>,
}

impl OpsManager {
    pub fn new(
        conn: &ConnectionBucket,
        executor: Box<dyn RemoteExecutor>,
        local_executor: Box<dyn RemoteExecutor>,
        gateway: Arc<dyn HttpGateway>,
    ) -> Self {
        Self {
            hostname: conn.hostname().to_string(),
            username: conn.admin_username().to_string(),
            password: conn.admin_password().to_string(),
            backup_dir: conn.destination().join(OPSMGR_BACKUP_DIR),
            executor,
            local_executor,
            gateway,
        }
    }

    /// Open an SSH session to the Ops Manager VM with the tempest credentials.
    pub fn connect(
        conn: &ConnectionBucket,
        config: &PipelineConfig,
        gateway: Arc<dyn HttpGateway>,
    ) -> Result<Self> {
        let ssh = SshConfig {
            username: conn.opsmanager_username().to_string(),
            password: conn.opsmanager_password().to_string(),
            host: conn.hostname().to_string(),
            port: config.ssh_port,
            private_key: None,
        };
        let executor = SshExecutor::connect(&ssh)?;

        Ok(Self::new(
            conn,
            Box::new(executor),
            Box::new(LocalExecutor::new()),
            gateway,
        ))
    }

    fn settings_url(&self) -> String {
        format!("https://{}/api/installation_settings", self.hostname)
    }

    fn assets_url(&self) -> String {
        format!("https://{}/api/installation_asset_collection", self.hostname)
    }

    fn entity(&self, url: String) -> RequestEntity {
        RequestEntity {
            url,
            username: self.username.clone(),
            password: self.password.clone(),
            content_type: "application/octet-stream".to_string(),
        }
    }

    fn create_file(&self, name: &str) -> Result<BufWriter<File>> {
        fs::create_dir_all(&self.backup_dir)?;
        Ok(BufWriter::new(File::create(self.backup_dir.join(name))?))
    }

    fn copy_deployments(&mut self) -> Result<()> {
        tracing::info!("Copying Ops Manager deployments");
        let mut file = self.create_file(OPSMGR_DEPLOYMENTS_FILENAME)?;
        self.executor.execute(
            &mut file,
            "cd /var/tempest/workspaces/default && tar cz deployments",
        )?;
        file.flush()?;
        Ok(())
    }

    fn extract(&mut self) -> Result<()> {
        let archive = self.backup_dir.join(OPSMGR_DEPLOYMENTS_FILENAME);
        let command = format!(
            "tar -xf {} -C {}",
            shell_quote(&archive.to_string_lossy()),
            shell_quote(&self.backup_dir.to_string_lossy())
        );
        tracing::debug!(command = %command, "Extracting deployments");
        self.local_executor.execute(&mut std::io::sink(), &command)?;

        let deployments_file = self
            .backup_dir
            .join(OPSMGR_DEPLOYMENTS_DIR)
            .join(DEPLOYMENTS_FILE_NAME);
        let key = extract_encryption_key(&deployments_file)?;

        let mut key_file = self.create_file(OPSMGR_ENCRYPTIONKEY_FILENAME)?;
        key_file.write_all(key.as_bytes())?;
        key_file.flush()?;
        Ok(())
    }

    fn export_url_to_file(&self, url: String, filename: &str) -> Result<()> {
        tracing::debug!(url = %url, filename, "Exporting url to file");
        let request = self.entity(url);
        let mut response = self
            .gateway
            .get(&request)?
            .error_for_status(&request.url)?;

        let mut file = self.create_file(filename)?;
        std::io::copy(&mut response.body, &mut file)?;
        file.flush()?;
        Ok(())
    }

    fn import_installation(&mut self) -> Result<()> {
        let assets = self.backup_dir.join(OPSMGR_INSTALLATION_ASSETS_FILENAME);
        if !assets.exists() {
            return Err(BackupError::InvalidPath(assets));
        }

        tracing::info!(file = %assets.display(), "Uploading installation assets");
        let request = self.entity(self.assets_url());
        self.gateway
            .upload(&request, OPSMGR_INSTALLATION_ASSETS_POSTFIELD_NAME, &assets)?
            .error_for_status(&request.url)?;

        self.remove_existing_deployment_files()
    }

    fn remove_existing_deployment_files(&mut self) -> Result<()> {
        let command = format!(
            "if [ -f {OPSMGR_DEPLOYMENTS_FILE} ]; then sudo rm {OPSMGR_DEPLOYMENTS_FILE};fi"
        );
        self.executor.execute(&mut std::io::sink(), &command)
    }
}

impl Tile for OpsManager {
    fn name(&self) -> &str {
        "opsmanager"
    }

    fn backup(&mut self) -> Result<()> {
        self.copy_deployments()?;
        self.extract()?;
        self.export_url_to_file(self.settings_url(), OPSMGR_INSTALLATION_SETTINGS_FILENAME)?;
        self.export_url_to_file(self.assets_url(), OPSMGR_INSTALLATION_ASSETS_FILENAME)?;
        tracing::info!(dir = %self.backup_dir.display(), "Ops Manager backup complete");
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.import_installation()?;
        tracing::info!("Ops Manager restore complete");
        Ok(())
    }
}

/// First `db_encryption_key` value found anywhere in the deployments file.
pub fn extract_encryption_key(deployments_file: &Path) -> Result<String> {
    let content = fs::read_to_string(deployments_file)?;
    let document: serde_yaml::Value = serde_yaml::from_str(&content)?;

    find_key(&document, ENCRYPTION_KEY_FIELD)
        .ok_or_else(|| BackupError::EncryptionKeyNotFound(deployments_file.to_path_buf()))
}

fn find_key(value: &serde_yaml::Value, key: &str) -> Option<String> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                if k.as_str() == Some(key) {
                    if let Some(found) = v.as_str() {
                        return Some(found.to_string());
                    }
                }
            }
            map.values().find_map(|v| find_key(v, key))
        }
        serde_yaml::Value::Sequence(items) => items.iter().find_map(|v| find_key(v, key)),
        _ => None,
    }
}
