//! Job runners and the factory that selects one per record.

mod orchestrated;
mod simple;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::JobError;
use crate::types::JobRecord;

pub use orchestrated::OrchestratedJobRunner;
pub use simple::SimpleJobRunner;

/// Executes one leased job record and reports the result to the scheduler.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, record: &mut JobRecord) -> Result<(), JobError>;
}

/// Picks the runner for a record from its `is_orchestrated` flag.
#[derive(Clone)]
pub struct JobRunnerFactory {
    simple: Arc<SimpleJobRunner>,
    orchestrated: Arc<OrchestratedJobRunner>,
}

impl JobRunnerFactory {
    pub fn new(simple: SimpleJobRunner, orchestrated: OrchestratedJobRunner) -> Self {
        Self {
            simple: Arc::new(simple),
            orchestrated: Arc::new(orchestrated),
        }
    }

    pub fn select_runner(&self, record: &JobRecord) -> &dyn JobRunner {
        if record.is_orchestrated {
            self.orchestrated.as_ref()
        } else {
            self.simple.as_ref()
        }
    }
}

impl std::fmt::Debug for JobRunnerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunnerFactory")
            .field("orchestrated", &self.orchestrated)
            .finish_non_exhaustive()
    }
}
