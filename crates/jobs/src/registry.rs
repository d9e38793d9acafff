//! Job type to handler mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::JobError;
use crate::handlers::{ClaimDealForExistingCards, ClaimDealsForNewCard, ClaimJobDeps, PingJob};
use crate::orchestrator::OrchestratedJob;
use crate::types::{JobRecord, JobType};

/// A job executed once by the simple runner.
#[async_trait]
pub trait SimpleJob: Send + Sync {
    async fn execute(&self, record: &JobRecord) -> Result<(), JobError>;
}

pub type SimpleJobFactory = Arc<dyn Fn(&JobRecord) -> Result<Box<dyn SimpleJob>, JobError> + Send + Sync>;

pub type OrchestratedJobFactory =
    Arc<dyn Fn(&JobRecord) -> Result<Box<dyn OrchestratedJob>, JobError> + Send + Sync>;

#[derive(Clone)]
pub enum JobFactory {
    Simple(SimpleJobFactory),
    Orchestrated(OrchestratedJobFactory),
}

/// Resolves a `JobType` to a fresh handler instance built from the record.
#[derive(Clone, Default)]
pub struct JobRegistry {
    factories: BTreeMap<JobType, JobFactory>,
}

impl JobRegistry {
    /// Empty registry; every job type is unresolved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every job type.
    pub fn standard(deps: ClaimJobDeps) -> Self {
        let mut registry = Self::new();
        for job_type in JobType::ALL {
            let factory = match job_type {
                JobType::Ping => JobFactory::Simple(Arc::new(|_: &JobRecord| Ok(Box::new(PingJob) as Box<dyn SimpleJob>))),
                JobType::ClaimDealsForNewCard => {
                    let deps = deps.clone();
                    JobFactory::Orchestrated(Arc::new(move |record: &JobRecord| {
                        let job = ClaimDealsForNewCard::from_record(record, deps.clone())?;
                        Ok(Box::new(job) as Box<dyn OrchestratedJob>)
                    }))
                }
                JobType::ClaimDealForExistingCards => {
                    let deps = deps.clone();
                    JobFactory::Orchestrated(Arc::new(move |record: &JobRecord| {
                        let job = ClaimDealForExistingCards::from_record(record, deps.clone())?;
                        Ok(Box::new(job) as Box<dyn OrchestratedJob>)
                    }))
                }
            };
            registry.factories.insert(job_type, factory);
        }
        registry
    }

    /// Register (or replace) the simple handler for `job_type`.
    pub fn with_simple<F>(mut self, job_type: JobType, factory: F) -> Self
    where
        F: Fn(&JobRecord) -> Result<Box<dyn SimpleJob>, JobError> + Send + Sync + 'static,
    {
        self.factories.insert(job_type, JobFactory::Simple(Arc::new(factory)));
        self
    }

    /// Register (or replace) the orchestrated handler for `job_type`.
    pub fn with_orchestrated<F>(mut self, job_type: JobType, factory: F) -> Self
    where
        F: Fn(&JobRecord) -> Result<Box<dyn OrchestratedJob>, JobError> + Send + Sync + 'static,
    {
        self.factories.insert(job_type, JobFactory::Orchestrated(Arc::new(factory)));
        self
    }

    /// Simple handler for the record's type. `None` if unregistered or registered
    /// as orchestrated.
    pub fn simple(&self, record: &JobRecord) -> Option<Result<Box<dyn SimpleJob>, JobError>> {
        match self.factories.get(&record.job_type)? {
            JobFactory::Simple(factory) => Some(factory(record)),
            JobFactory::Orchestrated(_) => None,
        }
    }

    /// Orchestrated handler for the record's type. `None` if unregistered or
    /// registered as simple.
    pub fn orchestrated(&self, record: &JobRecord) -> Option<Result<Box<dyn OrchestratedJob>, JobError>> {
        match self.factories.get(&record.job_type)? {
            JobFactory::Orchestrated(factory) => Some(factory(record)),
            JobFactory::Simple(_) => None,
        }
    }

    pub fn job_types(&self) -> Vec<JobType> {
        self.factories.keys().copied().collect()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry").field("job_types", &self.job_types()).finish()
    }
}
