//! Client for the BOSH director API.
//!
//! Used by the runtime tile for the credential pre-flight check, to fetch
//! the deployment manifest and to stop/start cloud-controller jobs. Job
//! state changes are asynchronous on the director side: the PUT answers
//! with a redirect to a task which is polled until it settles.

use crate::config::PipelineConfig;
use crate::transport::{HttpGateway, RequestEntity};
use crate::{BackupError, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct VmObject {
    pub job: String,

    #[serde(default)]
    pub index: u32,
}

/// A cloud-controller job instance addressed by name and index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcJob {
    pub job: String,
    pub index: u32,
}

/// Cloud-controller VMs (API and worker jobs) in listing order.
pub fn cloud_controller_jobs(vms: &[VmObject]) -> Vec<CcJob> {
    vms.iter()
        .filter(|vm| vm.job.starts_with("cloud_controller"))
        .map(|vm| CcJob {
            job: vm.job.clone(),
            index: vm.index,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Stopped,
    Started,
}

impl JobState {
    fn as_str(self) -> &'static str {
        match self {
            JobState::Stopped => "stopped",
            JobState::Started => "started",
        }
    }
}

#[derive(Deserialize)]
struct DeploymentResponse {
    manifest: String,
}

#[derive(Deserialize)]
struct TaskResponse {
    #[serde(default)]
    id: serde_json::Value,
    state: String,
}

pub struct DirectorClient<'a> {
    gateway: &'a dyn HttpGateway,
    base_url: String,
    username: String,
    password: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl<'a> DirectorClient<'a> {
    pub fn new(
        gateway: &'a dyn HttpGateway,
        ip: &str,
        username: &str,
        password: &str,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            base_url: format!("https://{}:{}", ip, config.director_port),
            username: username.to_string(),
            password: password.to_string(),
            poll_interval: config.task_poll_interval(),
            poll_attempts: config.task_poll_attempts.max(1),
        }
    }

    fn entity(&self, url: String, content_type: &str) -> RequestEntity {
        RequestEntity {
            url,
            username: self.username.clone(),
            password: self.password.clone(),
            content_type: content_type.to_string(),
        }
    }

    fn get_text(&self, path: &str) -> Result<String> {
        let request = self.entity(format!("{}{}", self.base_url, path), "application/json");
        self.gateway
            .get(&request)?
            .error_for_status(&request.url)?
            .text()
    }

    /// Pre-flight check; fails when the director rejects the credentials.
    pub fn info(&self) -> Result<()> {
        self.get_text("/info").map(|_| ())
    }

    pub fn manifest(&self, deployment: &str) -> Result<String> {
        let body = self.get_text(&format!("/deployments/{deployment}"))?;
        let response: DeploymentResponse = serde_json::from_str(&body)?;
        Ok(response.manifest)
    }

    pub fn vms(&self, deployment: &str) -> Result<Vec<VmObject>> {
        let body = self.get_text(&format!("/deployments/{deployment}/vms"))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Change one job instance's state and wait for the resulting task.
    pub fn change_job_state(
        &self,
        deployment: &str,
        job: &str,
        index: u32,
        state: JobState,
        manifest: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/deployments/{}/jobs/{}/{}?state={}",
            self.base_url,
            deployment,
            job,
            index,
            state.as_str()
        );
        tracing::info!(job, index, state = state.as_str(), "Changing job state");

        let request = self.entity(url, "text/yaml");
        let response = self
            .gateway
            .put(&request, manifest.as_bytes().to_vec())?;

        match response.location.clone() {
            Some(location) if (300..400).contains(&response.status) => {
                self.wait_for_task(&location)
            }
            _ => response.error_for_status(&request.url).map(|_| ()),
        }
    }

    fn wait_for_task(&self, location: &str) -> Result<()> {
        let url = if location.starts_with("http") {
            location.to_string()
        } else {
            format!("{}{}", self.base_url, location)
        };
        let request = self.entity(url, "application/json");

        let mut last = TaskResponse {
            id: serde_json::Value::Null,
            state: "unknown".to_string(),
        };

        for attempt in 0..self.poll_attempts {
            if attempt > 0 {
                std::thread::sleep(self.poll_interval);
            }

            let body = self
                .gateway
                .get(&request)?
                .error_for_status(&request.url)?
                .text()?;
            let task: TaskResponse = serde_json::from_str(&body)?;

            match task.state.as_str() {
                "done" => return Ok(()),
                "error" | "cancelled" | "timeout" => {
                    return Err(BackupError::DirectorTask {
                        id: task.id.to_string(),
                        state: task.state,
                    })
                }
                _ => {
                    tracing::debug!(url = %request.url, state = %task.state, "Task still running");
                    last = task;
                }
            }
        }

        Err(BackupError::DirectorTask {
            id: last.id.to_string(),
            state: format!("{} (gave up polling)", last.state),
        })
    }
}
