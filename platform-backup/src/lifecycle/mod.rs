//! Stop dependents before a database action, restart them afterwards.
//!
//! [`quiesce`] hands out a [`Quiesced`] guard. Dropping the guard restarts
//! the dependents, so every exit path of the caller (including `?` on a
//! failed dump) releases them exactly once.

pub mod cloud_controller;

use crate::config::StopPolicy;
use crate::Result;

pub use cloud_controller::CloudController;

/// A set of jobs that can be stopped and started as a unit.
pub trait JobController {
    fn stop(&mut self) -> Result<()>;

    fn start(&mut self) -> Result<()>;
}

/// Dependents are stopped while this lives.
#[must_use = "dropping the guard restarts the jobs immediately"]
pub struct Quiesced<'a, C: JobController + ?Sized> {
    controller: &'a mut C,
}

impl<C: JobController + ?Sized> Drop for Quiesced<'_, C> {
    fn drop(&mut self) {
        tracing::info!("Restarting dependent jobs");
        if let Err(e) = self.controller.start() {
            tracing::warn!(error = %e, "Failed to restart dependent jobs");
        }
    }
}

/// Stop the controller's jobs and return the guard that restarts them.
///
/// The guard is armed before the stop is attempted: a partial stop is
/// restarted too. Under [`StopPolicy::Required`] a stop failure is
/// returned after the guard has already run its restart.
pub fn quiesce<C: JobController + ?Sized>(
    controller: &mut C,
    policy: StopPolicy,
) -> Result<Quiesced<'_, C>> {
    let mut guard = Quiesced { controller };

    tracing::info!("Stopping dependent jobs");
    if let Err(e) = guard.controller.stop() {
        match policy {
            StopPolicy::BestEffort => {
                tracing::warn!(error = %e, "Failed to stop dependent jobs, continuing");
            }
            StopPolicy::Required => return Err(e),
        }
    }

    Ok(guard)
}
