//! Job and scheduler errors.

use thiserror::Error;

use cardlink_core::ResultCode;
use cardlink_operations::StoreError;

use crate::types::JobId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors raised while executing a job.
///
/// Only `Outcome` is recoverable inside an orchestrated run; everything else aborts
/// the run and surfaces to the worker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// A step failed with a recognized canonical outcome.
    #[error("step failed with outcome {0}")]
    Outcome(ResultCode),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The recognized outcome carried by this error, if any.
    pub fn outcome(&self) -> Option<ResultCode> {
        match self {
            JobError::Outcome(code) => Some(*code),
            _ => None,
        }
    }
}
