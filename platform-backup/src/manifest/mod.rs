//! Deployment manifest (`installation.json`) model.
//!
//! Two schema generations exist: the legacy one embeds IPs on the job
//! records, the newer one keeps them in a separate `ip_assignments` table
//! keyed by product, job and availability-zone GUIDs. Both deserialize into
//! the same types; [`resolver::ManifestView`] hides the difference.

pub mod resolver;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

pub use resolver::{ComponentSpec, ManifestView, SchemaGeneration};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallationSettings {
    #[serde(default)]
    pub infrastructure: Option<Infrastructure>,

    #[serde(default)]
    pub products: Vec<Product>,

    #[serde(default)]
    pub ip_assignments: Option<IpAssignments>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Infrastructure {
    #[serde(default)]
    pub iaas_configuration: Option<IaasConfiguration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IaasConfiguration {
    #[serde(default)]
    pub ssh_private_key: Option<String>,
}

/// product GUID -> job GUID -> availability-zone GUID -> IPs
pub type AssignmentTable = HashMap<String, HashMap<String, HashMap<String, Vec<String>>>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpAssignments {
    #[serde(default)]
    pub assignments: AssignmentTable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    pub identifier: String,

    #[serde(default)]
    pub guid: String,

    #[serde(default)]
    pub installation_name: Option<String>,

    #[serde(default)]
    pub availability_zone_references: Vec<String>,

    /// Legacy schema: job GUID -> IPs
    #[serde(default)]
    pub ips: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    pub identifier: String,

    #[serde(default)]
    pub guid: String,

    #[serde(default)]
    pub instances: Vec<Instance>,

    #[serde(default)]
    pub properties: Vec<Property>,

    /// Legacy schema: IPs of the job's VMs
    #[serde(default)]
    pub ips: Vec<String>,
}

impl Job {
    /// At least one instance group is configured to run.
    pub fn is_running(&self) -> bool {
        self.instances.iter().any(|instance| instance.value >= 1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub identifier: String,

    #[serde(default)]
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub identifier: String,

    #[serde(default)]
    pub value: serde_json::Value,
}

impl Property {
    /// The `(identity, password)` pair when the value is a credential object.
    pub fn credential(&self) -> Option<(&str, &str)> {
        let identity = self.value.get("identity")?.as_str()?;
        let password = self.value.get("password")?.as_str()?;
        Some((identity, password))
    }
}

impl InstallationSettings {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}
