use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::JobRunner;
use crate::error::JobError;
use crate::registry::JobRegistry;
use crate::scheduler::Scheduler;
use crate::types::JobRecord;

/// Runs a simple job once. Handler failures are logged, never retried, and the
/// iteration is always completed.
pub struct SimpleJobRunner {
    registry: Arc<JobRegistry>,
    scheduler: Arc<dyn Scheduler>,
}

impl SimpleJobRunner {
    pub fn new(registry: Arc<JobRegistry>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { registry, scheduler }
    }
}

#[async_trait]
impl JobRunner for SimpleJobRunner {
    async fn run(&self, record: &mut JobRecord) -> Result<(), JobError> {
        match self.registry.simple(record) {
            Some(Ok(job)) => match job.execute(record).await {
                Ok(()) => debug!(job_id = %record.id, job_type = %record.job_type, "simple job completed"),
                Err(err) => error!(
                    job_id = %record.id,
                    job_type = %record.job_type,
                    error = %err,
                    "simple job failed"
                ),
            },
            Some(Err(err)) => error!(
                job_id = %record.id,
                job_type = %record.job_type,
                error = %err,
                "failed to build simple job"
            ),
            None => warn!(job_id = %record.id, job_type = %record.job_type, "no handler for simple job"),
        }

        self.scheduler.complete_job_iteration(record).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SimpleJobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleJobRunner")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
