//! Background job execution for cardlink.
//!
//! ## Design
//!
//! - Job records live in a `Scheduler` (lease-based, at-least-once delivery)
//! - Simple jobs run once and always complete their iteration
//! - Orchestrated jobs run task batches with bounded in-process retries and
//!   exponential backoff, then report Success / Terminal / NonTerminal
//! - Job types resolve to handlers through a closed `JobRegistry`
//!
//! ## Components
//!
//! - `JobRecord`: persisted job with payload, state, and recurrence
//! - `Scheduler` / `InMemoryScheduler`: queue and record store
//! - `JobRunnerFactory`: picks the simple or orchestrated runner per record
//! - `JobOrchestrator`: executes one batch of an orchestrated job
//! - `JobWorker`: polls the scheduler and runs leased jobs concurrently

pub mod config;
pub mod delay;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod types;
pub mod worker;

pub use config::{ConfigError, RunnerConfig, WorkerConfig};
pub use delay::{Delay, RecordingDelay, TokioDelay};
pub use error::{JobError, SchedulerError};
pub use handlers::{ClaimDealForExistingCards, ClaimDealsForNewCard, ClaimJobDeps, PingJob};
pub use orchestrator::{JobOrchestrator, OrchestratedJob, OrchestratedTask};
pub use registry::{JobFactory, JobRegistry, OrchestratedJobFactory, SimpleJob, SimpleJobFactory};
pub use runner::{JobRunner, JobRunnerFactory, OrchestratedJobRunner, SimpleJobRunner};
pub use scheduler::{Clock, InMemoryScheduler, Scheduler, SchedulerStats};
pub use types::{BackoffPolicy, BackoffStrategy, ExecutionResult, JobId, JobRecord, JobState, JobType, Recurrence};
pub use worker::{JobWorker, JobWorkerHandle, WorkerStats};
