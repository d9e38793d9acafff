use async_trait::async_trait;
use tracing::info;

use crate::error::JobError;
use crate::registry::SimpleJob;
use crate::types::JobRecord;

/// Heartbeat job.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingJob;

#[async_trait]
impl SimpleJob for PingJob {
    async fn execute(&self, record: &JobRecord) -> Result<(), JobError> {
        info!(job_id = %record.id, description = %record.description, attempt = record.attempt, "ping");
        Ok(())
    }
}
