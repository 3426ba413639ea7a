//! Runtime tile: database tier and shared filesystem of the `cf` product.
//!
//! Credentials come from the installation settings exported by the Ops
//! Manager tile. Cloud-controller jobs are stopped through the director
//! for the duration of the database action and restarted afterwards.

use super::{Tile, TileAction};
use crate::config::{PipelineConfig, StopPolicy};
use crate::director::{cloud_controller_jobs, DirectorClient};
use crate::lifecycle::{quiesce, CloudController};
use crate::manifest::resolver::DIRECTOR_JOB;
use crate::manifest::{InstallationSettings, ManifestView};
use crate::persistence::{AdapterFactory, ComponentDump, PersistenceBackup};
use crate::transport::HttpGateway;
use crate::{BackupError, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of a component's archive under the target directory.
pub fn backup_file_name(component: &str) -> String {
    format!("{component}.backup")
}

pub struct ElasticRuntime {
    settings_path: PathBuf,
    target_dir: PathBuf,
    gateway: Arc<dyn HttpGateway>,
    factory: Box<dyn AdapterFactory>,
    config: PipelineConfig,
}

impl ElasticRuntime {
    pub fn new(
        settings_path: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        gateway: Arc<dyn HttpGateway>,
        factory: Box<dyn AdapterFactory>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            settings_path: settings_path.into(),
            target_dir: target_dir.into(),
            gateway,
            factory,
            config,
        }
    }

    fn backup_restore(&self, action: TileAction) -> Result<()> {
        let settings = InstallationSettings::from_file(&self.settings_path)?;
        let view = ManifestView::new(&settings);
        tracing::debug!(schema = ?view.schema(), "Loaded installation settings");

        let bosh_product = self.config.resolved_release().bosh_product_name();
        let (director_ip, director_pass) =
            view.password_and_ip(bosh_product, DIRECTOR_JOB, DIRECTOR_JOB)?;

        let components: Vec<ComponentDump> = view
            .persistence_components()?
            .iter()
            .filter_map(|spec| {
                let mut component = ComponentDump::new(spec);
                if let Err(e) = view.populate(&mut component).and_then(|_| component.validate()) {
                    tracing::warn!(component = %spec.component, error = %e, "Skipping component");
                    return None;
                }
                Some(component)
            })
            .collect();

        // no valid component: fail before the director is contacted
        if components.is_empty() {
            return Err(BackupError::EmptyPersistenceList);
        }

        let director = DirectorClient::new(
            self.gateway.as_ref(),
            &director_ip,
            DIRECTOR_JOB,
            &director_pass,
            &self.config,
        );
        if let Err(e) = director.info() {
            tracing::error!(error = %e, "Director pre-flight check failed");
            return Err(BackupError::DirectorCredentialsInvalid);
        }

        let deployment = view.deployment_name()?;
        let quiesce_target = director.manifest(&deployment).and_then(|manifest| {
            let jobs = cloud_controller_jobs(&director.vms(&deployment)?);
            Ok((manifest, jobs))
        });

        match quiesce_target {
            Ok((manifest, jobs)) => {
                tracing::info!(deployment = %deployment, jobs = jobs.len(), "Quiescing cloud controllers");
                let mut controller = CloudController::new(director, &deployment, manifest, jobs);
                let _quiesced = quiesce(&mut controller, self.config.stop_policy)?;
                self.run_db_action(&components, action)
            }
            Err(e) if self.config.stop_policy == StopPolicy::BestEffort => {
                tracing::warn!(error = %e, "Could not list cloud controllers, continuing without stopping them");
                self.run_db_action(&components, action)
            }
            Err(e) => Err(e),
        }
    }

    /// Dump or import every valid component in order.
    ///
    /// Invalid components are skipped. The first adapter failure aborts
    /// with [`BackupError::DatabaseAction`]; its cause is logged here.
    pub fn run_db_action(&self, components: &[ComponentDump], action: TileAction) -> Result<()> {
        let mut processed = 0;

        for component in components {
            if let Err(e) = component.validate() {
                tracing::warn!(component = %component.component, error = %e, "Skipping component");
                continue;
            }
            processed += 1;

            let path = self.target_dir.join(backup_file_name(&component.component));
            let result = match action {
                TileAction::Backup => self.export(component, &path),
                TileAction::Restore => self.import(component, &path),
            };

            if let Err(e) = result {
                tracing::error!(component = %component.component, action = %action, error = %e, "Database action failed");
                return Err(BackupError::DatabaseAction {
                    component: component.component.clone(),
                });
            }
        }

        if processed == 0 {
            return Err(BackupError::EmptyPersistenceList);
        }
        Ok(())
    }

    fn export(&self, component: &ComponentDump, path: &Path) -> Result<()> {
        tracing::info!(component = %component.component, "Exporting");
        let mut adapter = self.factory.adapter_for(component)?;

        fs::create_dir_all(&self.target_dir)?;
        let result = write_archive(adapter.as_mut(), path);
        if result.is_err() {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(file = %path.display(), error = %e, "Could not remove partial backup");
            }
        }
        result
    }

    fn import(&self, component: &ComponentDump, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(BackupError::InvalidPath(path.to_path_buf()));
        }

        tracing::info!(component = %component.component, "Restoring");
        let mut adapter = self.factory.adapter_for(component)?;
        let mut reader = BufReader::new(File::open(path)?);
        adapter.import(&mut reader)?;
        tracing::debug!(component = %component.component, "Done restoring");
        Ok(())
    }
}

fn write_archive(adapter: &mut dyn PersistenceBackup, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    adapter.dump(&mut writer)?;
    writer.flush()?;
    Ok(())
}

impl Tile for ElasticRuntime {
    fn name(&self) -> &str {
        "elastic-runtime"
    }

    fn backup(&mut self) -> Result<()> {
        self.backup_restore(TileAction::Backup)
    }

    fn restore(&mut self) -> Result<()> {
        self.backup_restore(TileAction::Restore)
    }
}
