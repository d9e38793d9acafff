//! Job worker: polls the scheduler and runs leased records concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::config::WorkerConfig;
use crate::runner::JobRunnerFactory;
use crate::scheduler::Scheduler;

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_panicked: u64,
    pub poll_errors: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    poll_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, started_at: Instant) -> WorkerStats {
        WorkerStats {
            jobs_started: self.started.load(Ordering::Relaxed),
            jobs_succeeded: self.succeeded.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            jobs_panicked: self.panicked.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            uptime_secs: started_at.elapsed().as_secs(),
        }
    }
}

/// Background job worker.
///
/// One tokio task per leased record, at most `max_concurrent` at a time. Runner
/// errors and panics are logged and never stop the loop.
pub struct JobWorker {
    scheduler: Arc<dyn Scheduler>,
    runners: JobRunnerFactory,
    config: WorkerConfig,
}

impl JobWorker {
    pub fn new(scheduler: Arc<dyn Scheduler>, runners: JobRunnerFactory, config: WorkerConfig) -> Self {
        Self {
            scheduler,
            runners,
            config,
        }
    }

    /// Spawn the polling loop on the current tokio runtime.
    pub fn spawn(self) -> JobWorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());
        let started_at = Instant::now();

        let join = tokio::spawn(self.run(shutdown.clone(), counters.clone()));

        JobWorkerHandle {
            shutdown,
            join,
            counters,
            started_at,
        }
    }

    async fn run(self, shutdown: Arc<Notify>, counters: Arc<Counters>) {
        let name = self.config.name.clone();
        info!(worker = %name, max_concurrent = self.config.max_concurrent, "job worker started");

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                record_join(&name, &counters, joined);
            }

            let permit = tokio::select! {
                _ = shutdown.notified() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.scheduler.dequeue_leased_job().await {
                Ok(Some(mut record)) => {
                    Counters::bump(&counters.started);
                    debug!(worker = %name, job_id = %record.id, job_type = %record.job_type, "leased job");

                    let runners = self.runners.clone();
                    let worker = name.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        let result = runners.select_runner(&record).run(&mut record).await;
                        if let Err(err) = &result {
                            error!(worker = %worker, job_id = %record.id, error = %err, "job run aborted");
                        }
                        result.is_ok()
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.notified() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(err) => {
                    drop(permit);
                    Counters::bump(&counters.poll_errors);
                    error!(worker = %name, error = %err, "failed to lease job");
                    tokio::select! {
                        _ = shutdown.notified() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            record_join(&name, &counters, joined);
        }
        info!(worker = %name, "job worker stopped");
    }
}

fn record_join(worker: &str, counters: &Counters, joined: Result<bool, JoinError>) {
    match joined {
        Ok(true) => Counters::bump(&counters.succeeded),
        Ok(false) => Counters::bump(&counters.failed),
        Err(err) => {
            Counters::bump(&counters.panicked);
            error!(worker = %worker, error = %err, "job task panicked");
        }
    }
}

impl std::fmt::Debug for JobWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWorker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct JobWorkerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
    counters: Arc<Counters>,
    started_at: Instant,
}

impl JobWorkerHandle {
    /// Stop polling, wait for in-flight jobs, and return final statistics.
    pub async fn shutdown(self) -> WorkerStats {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            error!(error = %err, "job worker loop panicked");
        }
        self.counters.snapshot(self.started_at)
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot(self.started_at)
    }
}
