//! Topology and credential resolution over an installation manifest.

use super::{InstallationSettings, Job, Product, Property};
use crate::persistence::{ComponentDump, EngineKind};
use crate::{BackupError, Result};

/// Product identifier of the runtime in the manifest.
pub const RUNTIME_PRODUCT: &str = "cf";

/// Default system account on every platform VM, used for SSH access.
pub const DEFAULT_SYSTEM_USER: &str = "vcap";

/// Job and identity of the director inside the BOSH product.
pub const DIRECTOR_JOB: &str = "director";

/// Manifest layout, detected once per manifest from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaGeneration {
    /// IPs live on the job records
    Legacy,
    /// IPs live in the top-level `ip_assignments` table
    IpAssignment,
}

/// A persistence component known to the runtime before credentials are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub kind: EngineKind,
    pub product: String,
    pub component: String,
    pub identity: String,
    pub database: Option<String>,
}

struct CatalogEntry {
    job: &'static str,
    kind: EngineKind,
    identity: &'static str,
    database: Option<&'static str>,
}

const RUNTIME_CATALOG: &[CatalogEntry] = &[
    CatalogEntry { job: "ccdb", kind: EngineKind::Postgres, identity: "admin", database: Some("ccdb") },
    CatalogEntry { job: "uaadb", kind: EngineKind::Postgres, identity: "root", database: Some("uaa") },
    CatalogEntry { job: "consoledb", kind: EngineKind::Postgres, identity: "root", database: Some("console") },
    CatalogEntry { job: "mysql", kind: EngineKind::Mysql, identity: "root", database: None },
    CatalogEntry { job: "nfs_server", kind: EngineKind::Nfs, identity: DEFAULT_SYSTEM_USER, database: None },
];

fn catalog_entry(job: &str) -> Option<&'static CatalogEntry> {
    RUNTIME_CATALOG.iter().find(|entry| entry.job == job)
}

/// Read-only view over a manifest with the schema generation fixed at construction.
pub struct ManifestView<'a> {
    settings: &'a InstallationSettings,
    schema: SchemaGeneration,
}

impl<'a> ManifestView<'a> {
    pub fn new(settings: &'a InstallationSettings) -> Self {
        let has_assignments = settings
            .ip_assignments
            .as_ref()
            .is_some_and(|table| !table.assignments.is_empty());
        let schema = if has_assignments {
            SchemaGeneration::IpAssignment
        } else {
            SchemaGeneration::Legacy
        };

        Self { settings, schema }
    }

    pub fn schema(&self) -> SchemaGeneration {
        self.schema
    }

    pub fn find_product(&self, identifier: &str) -> Result<&'a Product> {
        self.settings
            .products
            .iter()
            .find(|product| product.identifier == identifier)
            .ok_or_else(|| BackupError::ProductNotFound(identifier.to_string()))
    }

    /// IPs of a job. An unknown job, or one without assignments, yields an empty list.
    pub fn ips_by_product_and_job(&self, product: &str, job: &str) -> Result<Vec<String>> {
        let product = self.find_product(product)?;
        Ok(product
            .jobs
            .iter()
            .find(|candidate| candidate.identifier == job)
            .map(|job| self.job_ips(product, job))
            .unwrap_or_default())
    }

    fn job_ips(&self, product: &Product, job: &Job) -> Vec<String> {
        match self.schema {
            SchemaGeneration::Legacy => {
                if !job.ips.is_empty() {
                    job.ips.clone()
                } else {
                    product.ips.get(&job.guid).cloned().unwrap_or_default()
                }
            }
            SchemaGeneration::IpAssignment => {
                let Some(table) = self.settings.ip_assignments.as_ref() else {
                    return Vec::new();
                };
                let Some(jobs) = table.assignments.get(&product.guid) else {
                    return Vec::new();
                };
                let Some(zones) = jobs.get(&job.guid) else {
                    return Vec::new();
                };
                product
                    .availability_zone_references
                    .iter()
                    .filter_map(|zone| zones.get(zone))
                    .flatten()
                    .cloned()
                    .collect()
            }
        }
    }

    /// First IP of the job and the password stored for `identity`.
    ///
    /// The IP is empty when the job has no assigned address; callers catch
    /// that through [`ComponentDump::validate`].
    pub fn password_and_ip(&self, product: &str, job: &str, identity: &str) -> Result<(String, String)> {
        let product_record = self.find_product(product)?;
        let no_credential = || BackupError::NoCredentialFound {
            product: product.to_string(),
            job: job.to_string(),
            identity: identity.to_string(),
        };

        let job_record = product_record
            .jobs
            .iter()
            .find(|candidate| candidate.identifier == job)
            .ok_or_else(no_credential)?;

        let password = job_record
            .properties
            .iter()
            .filter_map(Property::credential)
            .find(|(candidate, _)| *candidate == identity)
            .map(|(_, password)| password.to_string())
            .ok_or_else(no_credential)?;

        let ip = self
            .job_ips(product_record, job_record)
            .into_iter()
            .next()
            .unwrap_or_default();

        Ok((ip, password))
    }

    /// Running catalogue jobs of a product with their catalogue entry, in
    /// manifest order.
    fn persistence_jobs(&self, product: &str) -> Result<Vec<(&'a Job, &'static CatalogEntry)>> {
        let product = self.find_product(product)?;
        Ok(product
            .jobs
            .iter()
            .filter(|job| job.is_running())
            .filter_map(|job| catalog_entry(&job.identifier).map(|entry| (job, entry)))
            .collect())
    }

    /// Running relational-database jobs of a product, in manifest order.
    pub fn relational_jobs(&self, product: &str) -> Result<Vec<&'a Job>> {
        Ok(self
            .persistence_jobs(product)?
            .into_iter()
            .filter(|(_, entry)| entry.kind.is_relational())
            .map(|(job, _)| job)
            .collect())
    }

    /// Every running job of the runtime that needs a persistence adapter,
    /// in manifest order.
    pub fn persistence_components(&self) -> Result<Vec<ComponentSpec>> {
        Ok(self
            .persistence_jobs(RUNTIME_PRODUCT)?
            .into_iter()
            .map(|(_, entry)| ComponentSpec {
                kind: entry.kind,
                product: RUNTIME_PRODUCT.to_string(),
                component: entry.job.to_string(),
                identity: entry.identity.to_string(),
                database: entry.database.map(str::to_string),
            })
            .collect())
    }

    /// Fill in IP and credentials. The primary credential is resolved
    /// first; the elevated one is only looked up when that succeeded.
    pub fn populate(&self, dump: &mut ComponentDump) -> Result<()> {
        dump.user = dump.identity.clone();
        dump.system_user = DEFAULT_SYSTEM_USER.to_string();
        dump.ssh_private_key = self.iaas_ssh_key().map(str::to_string);

        let (ip, pass) = self.password_and_ip(&dump.product, &dump.component, &dump.identity)?;
        dump.ip = ip;
        dump.pass = pass;

        let (_, system_pass) =
            self.password_and_ip(&dump.product, &dump.component, DEFAULT_SYSTEM_USER)?;
        dump.system_pass = system_pass;

        Ok(())
    }

    /// Name of the runtime deployment on the director.
    pub fn deployment_name(&self) -> Result<String> {
        let product = self.find_product(RUNTIME_PRODUCT)?;
        Ok(product
            .installation_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| product.guid.clone()))
    }

    pub fn iaas_ssh_key(&self) -> Option<&'a str> {
        self.settings
            .infrastructure
            .as_ref()?
            .iaas_configuration
            .as_ref()?
            .ssh_private_key
            .as_deref()
            .filter(|key| !key.is_empty())
    }
}
