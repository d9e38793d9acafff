//! Orchestrated jobs: batches of tasks driven by a `JobOrchestrator`.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::JobError;
use crate::types::{ExecutionResult, JobId};

/// One unit of work inside a batch.
#[async_trait]
pub trait OrchestratedTask: Send {
    fn name(&self) -> String;

    /// Run the task. `Err(JobError::Outcome(_))` is a recoverable failure; any other
    /// error aborts the whole run.
    async fn execute(&mut self) -> Result<ExecutionResult, JobError>;
}

/// A multi-step job.
#[async_trait]
pub trait OrchestratedJob: Send {
    /// Tasks for the next batch. An empty batch means there is nothing left to do.
    async fn next_tasks(&mut self) -> Result<Vec<Box<dyn OrchestratedTask>>, JobError>;

    /// Called once after the last batch. May adjust the final result.
    async fn cleanup(&mut self, result: ExecutionResult) -> ExecutionResult {
        result
    }

    /// Work left for another iteration after a successful run. A successful run
    /// with work left is requeued at once instead of completing.
    fn has_more_work(&self) -> bool {
        false
    }
}

/// Drives one orchestrated job instance batch by batch.
pub struct JobOrchestrator {
    job_id: JobId,
    job: Box<dyn OrchestratedJob>,
    cleaned_up: bool,
}

impl JobOrchestrator {
    pub fn new(job_id: JobId, job: Box<dyn OrchestratedJob>) -> Self {
        Self {
            job_id,
            job,
            cleaned_up: false,
        }
    }

    /// Run one batch. Returns the aggregated result and the number of tasks that
    /// ran.
    ///
    /// Aggregation: any TerminalError wins, then any NonTerminalError, else
    /// Success. An empty batch is Success with zero tasks.
    pub async fn execute(&mut self) -> Result<(ExecutionResult, usize), JobError> {
        let tasks = match self.job.next_tasks().await {
            Ok(tasks) => tasks,
            Err(JobError::Outcome(code)) => {
                warn!(job_id = %self.job_id, outcome = %code, "failed to prepare batch");
                return Ok((ExecutionResult::NonTerminalError, 0));
            }
            Err(err) => return Err(err),
        };

        let mut result = ExecutionResult::Success;
        let mut executed = 0;
        for mut task in tasks {
            let task_result = match task.execute().await {
                Ok(r) => r,
                Err(JobError::Outcome(code)) => {
                    warn!(job_id = %self.job_id, task = %task.name(), outcome = %code, "task failed");
                    ExecutionResult::NonTerminalError
                }
                Err(err) => return Err(err),
            };
            executed += 1;
            debug!(job_id = %self.job_id, task = %task.name(), result = ?task_result, "task finished");
            result = result.combine(task_result);
        }

        Ok((result, executed))
    }

    /// Let the job clean up. Runs at most once; later calls return `result` as is.
    pub async fn cleanup(&mut self, result: ExecutionResult) -> ExecutionResult {
        if self.cleaned_up {
            return result;
        }
        self.cleaned_up = true;
        let cleaned = self.job.cleanup(result).await;
        if cleaned != result {
            debug!(job_id = %self.job_id, before = ?result, after = ?cleaned, "cleanup adjusted result");
        }
        cleaned
    }

    pub fn has_more_work(&self) -> bool {
        self.job.has_more_work()
    }
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("job_id", &self.job_id)
            .field("cleaned_up", &self.cleaned_up)
            .finish_non_exhaustive()
    }
}
