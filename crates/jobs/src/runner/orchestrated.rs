use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug, info, info_span, warn};

use super::JobRunner;
use crate::config::RunnerConfig;
use crate::delay::Delay;
use crate::error::JobError;
use crate::orchestrator::JobOrchestrator;
use crate::registry::JobRegistry;
use crate::scheduler::Scheduler;
use crate::types::{ExecutionResult, JobRecord};

/// Drives an orchestrated job through bounded in-process retries.
///
/// ```text
/// batch ── NonTerminal, progress, budget left ──> sleep(latency); latency *= 2; batch
///   │
///   └─ Terminal | Success | no progress | budget spent ──> cleanup (once) ──> report
/// ```
///
/// Report: Success completes the iteration (or requeues at once while the job has
/// work left), TerminalError cancels the record and clears its payload,
/// NonTerminalError requeues with the scheduler's backoff.
pub struct OrchestratedJobRunner {
    registry: Arc<JobRegistry>,
    scheduler: Arc<dyn Scheduler>,
    delay: Arc<dyn Delay>,
    config: RunnerConfig,
}

impl OrchestratedJobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        scheduler: Arc<dyn Scheduler>,
        delay: Arc<dyn Delay>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            registry,
            scheduler,
            delay,
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    async fn drive(&self, orchestrator: &mut JobOrchestrator) -> Result<ExecutionResult, JobError> {
        let mut latency = self.config.initial_latency;
        let mut retries = 0;

        let result = loop {
            let (result, executed) = orchestrator.execute().await?;
            debug!(result = ?result, executed, retries, "batch finished");

            if result != ExecutionResult::NonTerminalError {
                break result;
            }
            if executed == 0 {
                debug!("no progress, leaving retry loop");
                break result;
            }
            if retries >= self.config.max_retries {
                debug!(max_retries = self.config.max_retries, "retry budget exhausted");
                break result;
            }

            retries += 1;
            self.delay.sleep(latency).await;
            latency = latency.saturating_mul(2);
        };

        Ok(orchestrator.cleanup(result).await)
    }

    async fn report(&self, record: &mut JobRecord, result: ExecutionResult, more_work: bool) -> Result<(), JobError> {
        match result {
            ExecutionResult::Success if more_work => {
                self.scheduler.continue_job(record).await?;
            }
            ExecutionResult::Success => {
                self.scheduler.complete_job_iteration(record).await?;
            }
            ExecutionResult::TerminalError => {
                record.mark_canceled();
                self.scheduler.update_job(record).await?;
            }
            ExecutionResult::NonTerminalError => {
                self.scheduler.exponentially_backoff(record).await?;
            }
        }
        info!(result = ?result, more_work, state = ?record.state, "orchestrated job reported");
        Ok(())
    }
}

#[async_trait]
impl JobRunner for OrchestratedJobRunner {
    async fn run(&self, record: &mut JobRecord) -> Result<(), JobError> {
        let span = info_span!(
            "orchestrated_job",
            job_id = %record.id,
            job_type = %record.job_type,
            attempt = record.attempt,
        );

        async {
            let (result, more_work) = match self.registry.orchestrated(record) {
                None => {
                    warn!("no handler for orchestrated job");
                    (ExecutionResult::TerminalError, false)
                }
                Some(Err(JobError::InvalidPayload(reason))) => {
                    warn!(reason = %reason, "invalid payload");
                    (ExecutionResult::TerminalError, false)
                }
                Some(Err(err)) => return Err(err),
                Some(Ok(job)) => {
                    let mut orchestrator = JobOrchestrator::new(record.id, job);
                    let result = self.drive(&mut orchestrator).await?;
                    (result, orchestrator.has_more_work())
                }
            };
            self.report(record, result, more_work).await
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for OrchestratedJobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratedJobRunner")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
