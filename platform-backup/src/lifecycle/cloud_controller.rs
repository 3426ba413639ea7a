//! Cloud-controller jobs of the runtime, driven through the director.

use super::JobController;
use crate::director::{CcJob, DirectorClient, JobState};
use crate::Result;

pub struct CloudController<'a> {
    director: DirectorClient<'a>,
    deployment: String,
    manifest: String,
    jobs: Vec<CcJob>,
}

impl<'a> CloudController<'a> {
    pub fn new(director: DirectorClient<'a>, deployment: &str, manifest: String, jobs: Vec<CcJob>) -> Self {
        Self {
            director,
            deployment: deployment.to_string(),
            manifest,
            jobs,
        }
    }

    fn change(&self, job: &CcJob, state: JobState) -> Result<()> {
        self.director
            .change_job_state(&self.deployment, &job.job, job.index, state, &self.manifest)
    }
}

impl JobController for CloudController<'_> {
    fn stop(&mut self) -> Result<()> {
        for job in &self.jobs {
            self.change(job, JobState::Stopped)?;
        }
        Ok(())
    }

    /// Every job gets a start request; the first failure is reported.
    fn start(&mut self) -> Result<()> {
        let mut first_error = None;
        for job in &self.jobs {
            if let Err(e) = self.change(job, JobState::Started) {
                tracing::warn!(job = %job.job, index = job.index, error = %e, "Failed to start job");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
