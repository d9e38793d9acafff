//! Job scheduler: queue and record store with lease-based visibility.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::types::{BackoffPolicy, JobId, JobRecord, JobState};

/// Scheduler abstraction. All job record mutation goes through these operations.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Enqueue a new record, first visible after `initial_delay`.
    async fn enqueue_job(&self, record: JobRecord, initial_delay: Duration) -> Result<JobId, SchedulerError>;

    /// Lease the next visible record, if any. Delivery is at-least-once: a record
    /// whose lease expired is handed out again.
    async fn dequeue_leased_job(&self) -> Result<Option<JobRecord>, SchedulerError>;

    /// Finish the current iteration. Recurring records are re-armed; others complete.
    async fn complete_job_iteration(&self, record: &mut JobRecord) -> Result<(), SchedulerError>;

    /// Persist the record as given.
    async fn update_job(&self, record: &JobRecord) -> Result<(), SchedulerError>;

    /// Requeue after the scheduler's own backoff delay.
    async fn exponentially_backoff(&self, record: &mut JobRecord) -> Result<(), SchedulerError>;

    /// Requeue for an immediate next run after a run that made progress but left
    /// work behind. Not a failure: the backoff count resets.
    async fn continue_job(&self, record: &mut JobRecord) -> Result<(), SchedulerError>;

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, SchedulerError>;

    async fn stats(&self) -> Result<SchedulerStats, SchedulerError>;
}

/// Record counts per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub canceled: usize,
}

/// Source of "now" for visibility decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// In-memory scheduler for tests/dev.
///
/// A record whose lease lapses `max_lapsed_leases` times in a row without being
/// reported is canceled instead of being leased again.
pub struct InMemoryScheduler {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    lease_duration: Duration,
    max_lapsed_leases: u32,
    backoff_policy: BackoffPolicy,
    clock: Clock,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            lease_duration: Duration::from_secs(300),
            max_lapsed_leases: 3,
            backoff_policy: BackoffPolicy::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn with_max_lapsed_leases(mut self, max: u32) -> Self {
        self.max_lapsed_leases = max.max(1);
        self
    }

    pub fn with_backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.backoff_policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn backoff_policy(&self) -> &BackoffPolicy {
        &self.backoff_policy
    }

    /// All records in FIFO order.
    pub fn snapshot(&self) -> Result<Vec<JobRecord>, SchedulerError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut records: Vec<_> = jobs.values().cloned().collect();
        records.sort_by_key(|r| (r.visible_at, r.created_at, r.id));
        Ok(records)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn store(&self, record: &JobRecord) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let slot = jobs.get_mut(&record.id).ok_or(SchedulerError::NotFound(record.id))?;
        *slot = record.clone();
        Ok(())
    }
}

impl Default for InMemoryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryScheduler")
            .field("lease_duration", &self.lease_duration)
            .field("max_lapsed_leases", &self.max_lapsed_leases)
            .field("backoff_policy", &self.backoff_policy)
            .finish_non_exhaustive()
    }
}

fn poisoned() -> SchedulerError {
    SchedulerError::Storage("lock poisoned".to_string())
}

fn after(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    async fn enqueue_job(&self, mut record: JobRecord, initial_delay: Duration) -> Result<JobId, SchedulerError> {
        let now = self.now();
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&record.id) {
            return Err(SchedulerError::AlreadyExists(record.id));
        }

        record.state = JobState::Pending;
        record.visible_at = after(now, initial_delay);
        record.updated_at = now;
        let id = record.id;
        debug!(job_id = %id, job_type = %record.job_type, visible_at = %record.visible_at, "job enqueued");
        jobs.insert(id, record);
        Ok(id)
    }

    async fn dequeue_leased_job(&self) -> Result<Option<JobRecord>, SchedulerError> {
        let now = self.now();
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;

        loop {
            // Pending and visible, or Running with an expired lease
            let next = jobs
                .values()
                .filter(|r| matches!(r.state, JobState::Pending | JobState::Running) && r.visible_at <= now)
                .min_by_key(|r| (r.visible_at, r.created_at, r.id))
                .map(|r| r.id);

            let Some(job_id) = next else {
                return Ok(None);
            };
            let Some(record) = jobs.get_mut(&job_id) else {
                return Ok(None);
            };

            if record.state == JobState::Running {
                record.lapsed_leases += 1;
                if record.lapsed_leases >= self.max_lapsed_leases {
                    warn!(
                        job_id = %job_id,
                        job_type = %record.job_type,
                        attempt = record.attempt,
                        lapsed_leases = record.lapsed_leases,
                        "lease lapsed too often, canceling job"
                    );
                    record.mark_canceled();
                    record.updated_at = now;
                    continue;
                }
                debug!(job_id = %job_id, attempt = record.attempt, "lease expired, re-leasing job");
            }
            record.mark_running(now, after(now, self.lease_duration));
            return Ok(Some(record.clone()));
        }
    }

    async fn complete_job_iteration(&self, record: &mut JobRecord) -> Result<(), SchedulerError> {
        let now = self.now();
        match record.recurrence.as_mut() {
            Some(recurrence) if recurrence.remaining != Some(0) => {
                if let Some(remaining) = recurrence.remaining.as_mut() {
                    *remaining -= 1;
                }
                record.state = JobState::Pending;
                record.visible_at = after(now, recurrence.interval);
            }
            _ => record.state = JobState::Completed,
        }
        record.backoff_count = 0;
        record.lapsed_leases = 0;
        record.updated_at = now;
        debug!(job_id = %record.id, state = ?record.state, "job iteration completed");
        self.store(record)
    }

    async fn update_job(&self, record: &JobRecord) -> Result<(), SchedulerError> {
        self.store(record)
    }

    async fn exponentially_backoff(&self, record: &mut JobRecord) -> Result<(), SchedulerError> {
        let now = self.now();
        record.backoff_count += 1;
        record.lapsed_leases = 0;
        let delay = self.backoff_policy.delay_for(record.backoff_count);
        record.state = JobState::Pending;
        record.visible_at = after(now, delay);
        record.updated_at = now;
        debug!(
            job_id = %record.id,
            backoff_count = record.backoff_count,
            delay_ms = delay.as_millis() as u64,
            "job backed off"
        );
        self.store(record)
    }

    async fn continue_job(&self, record: &mut JobRecord) -> Result<(), SchedulerError> {
        let now = self.now();
        record.state = JobState::Pending;
        record.backoff_count = 0;
        record.lapsed_leases = 0;
        record.visible_at = now;
        record.updated_at = now;
        debug!(job_id = %record.id, attempt = record.attempt, "job continues");
        self.store(record)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, SchedulerError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&job_id).cloned())
    }

    async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut stats = SchedulerStats::default();
        for record in jobs.values() {
            match record.state {
                JobState::Pending => stats.pending += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Canceled => stats.canceled += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobType, Recurrence};
    use std::sync::Mutex;

    /// Manually advanced clock.
    fn manual_clock() -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(Utc::now()));
        let handle = now.clone();
        (Arc::new(move || *now.lock().unwrap()), handle)
    }

    fn advance(handle: &Arc<Mutex<DateTime<Utc>>>, by: Duration) {
        let mut now = handle.lock().unwrap();
        *now = after(*now, by);
    }

    fn ping() -> JobRecord {
        JobRecord::simple(JobType::Ping, "heartbeat")
    }

    #[tokio::test]
    async fn enqueue_and_lease() {
        let scheduler = InMemoryScheduler::new();
        let job_id = scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();

        let leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(leased.id, job_id);
        assert_eq!(leased.state, JobState::Running);
        assert_eq!(leased.attempt, 1);
        assert!(leased.start_time.is_some());

        // No more jobs
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_rejected() {
        let scheduler = InMemoryScheduler::new();
        let record = ping();
        scheduler.enqueue_job(record.clone(), Duration::ZERO).await.unwrap();
        assert_eq!(
            scheduler.enqueue_job(record.clone(), Duration::ZERO).await,
            Err(SchedulerError::AlreadyExists(record.id))
        );
    }

    #[tokio::test]
    async fn initial_delay_hides_record() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new().with_clock(clock);
        scheduler.enqueue_job(ping(), Duration::from_secs(60)).await.unwrap();

        assert!(scheduler.dequeue_leased_job().await.unwrap().is_none());
        advance(&handle, Duration::from_secs(60));
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fifo_by_visibility_then_creation() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new().with_clock(clock);
        let first = ping();
        let mut second = ping();
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let delayed = ping();
        scheduler.enqueue_job(delayed.clone(), Duration::from_secs(5)).await.unwrap();
        scheduler.enqueue_job(second.clone(), Duration::ZERO).await.unwrap();
        scheduler.enqueue_job(first.clone(), Duration::ZERO).await.unwrap();
        advance(&handle, Duration::from_secs(5));

        let order: Vec<_> = [
            scheduler.dequeue_leased_job().await.unwrap().unwrap().id,
            scheduler.dequeue_leased_job().await.unwrap().unwrap().id,
            scheduler.dequeue_leased_job().await.unwrap().unwrap().id,
        ]
        .into();
        // Same visibility: the earlier-created record goes first.
        assert_eq!(order, vec![first.id, second.id, delayed.id]);
    }

    #[tokio::test]
    async fn expired_lease_is_handed_out_again() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new()
            .with_clock(clock)
            .with_lease_duration(Duration::from_secs(30));
        scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();

        let first = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        advance(&handle, Duration::from_secs(29));
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_none());

        advance(&handle, Duration::from_secs(1));
        let second = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn repeatedly_lapsed_lease_cancels_record() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new()
            .with_clock(clock)
            .with_lease_duration(Duration::from_secs(30))
            .with_max_lapsed_leases(2);
        let job_id = scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();

        scheduler.dequeue_leased_job().await.unwrap().unwrap();
        advance(&handle, Duration::from_secs(30));
        let again = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(again.lapsed_leases, 1);

        advance(&handle, Duration::from_secs(30));
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_none());
        let stored = scheduler.get(job_id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Canceled);
        assert_eq!(stored.attempt, 2);
        assert_eq!(scheduler.stats().await.unwrap().canceled, 1);
    }

    #[tokio::test]
    async fn canceled_record_does_not_block_the_queue() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new()
            .with_clock(clock)
            .with_lease_duration(Duration::from_secs(30))
            .with_max_lapsed_leases(1);
        scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();
        scheduler.dequeue_leased_job().await.unwrap().unwrap();
        let waiting = scheduler.enqueue_job(ping(), Duration::from_secs(30)).await.unwrap();

        advance(&handle, Duration::from_secs(30));
        let next = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(next.id, waiting);
    }

    #[tokio::test]
    async fn reporting_resets_lapsed_leases() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new()
            .with_clock(clock)
            .with_lease_duration(Duration::from_secs(30))
            .with_max_lapsed_leases(2);
        scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();

        scheduler.dequeue_leased_job().await.unwrap().unwrap();
        advance(&handle, Duration::from_secs(30));
        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(leased.lapsed_leases, 1);
        scheduler.continue_job(&mut leased).await.unwrap();
        assert_eq!(leased.lapsed_leases, 0);

        scheduler.dequeue_leased_job().await.unwrap().unwrap();
        advance(&handle, Duration::from_secs(30));
        let leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(leased.state, JobState::Running);
        assert_eq!(leased.attempt, 4);
    }

    #[tokio::test]
    async fn continued_job_is_visible_at_once_with_backoff_reset() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new().with_clock(clock);
        scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();

        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        scheduler.exponentially_backoff(&mut leased).await.unwrap();
        advance(&handle, scheduler.backoff_policy().delay_for(1));

        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(leased.backoff_count, 1);
        scheduler.continue_job(&mut leased).await.unwrap();
        assert_eq!(leased.state, JobState::Pending);
        assert_eq!(leased.backoff_count, 0);

        let next = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        assert_eq!(next.id, leased.id);
        assert_eq!(next.attempt, 3);
    }

    #[tokio::test]
    async fn recurring_job_is_rearmed_until_exhausted() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new().with_clock(clock);
        let record = ping().with_recurrence(Recurrence::times(Duration::from_secs(10), 1));
        scheduler.enqueue_job(record, Duration::ZERO).await.unwrap();

        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        scheduler.complete_job_iteration(&mut leased).await.unwrap();
        assert_eq!(leased.state, JobState::Pending);
        assert_eq!(leased.recurrence.unwrap().remaining, Some(0));
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_none());

        advance(&handle, Duration::from_secs(10));
        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        scheduler.complete_job_iteration(&mut leased).await.unwrap();
        assert_eq!(leased.state, JobState::Completed);
        assert_eq!(scheduler.get(leased.id).await.unwrap().unwrap().state, JobState::Completed);
    }

    #[tokio::test]
    async fn backoff_uses_scheduler_policy() {
        let (clock, handle) = manual_clock();
        let scheduler = InMemoryScheduler::new()
            .with_clock(clock)
            .with_backoff_policy(BackoffPolicy::exponential(Duration::from_secs(10), Duration::from_secs(600)));
        scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();

        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        scheduler.exponentially_backoff(&mut leased).await.unwrap();
        assert_eq!(leased.backoff_count, 1);
        advance(&handle, Duration::from_secs(9));
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_none());
        advance(&handle, Duration::from_secs(1));

        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        scheduler.exponentially_backoff(&mut leased).await.unwrap();
        assert_eq!(leased.backoff_count, 2);
        advance(&handle, Duration::from_secs(19));
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_none());
        advance(&handle, Duration::from_secs(1));
        assert!(scheduler.dequeue_leased_job().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_unknown_job_fails() {
        let scheduler = InMemoryScheduler::new();
        let record = ping();
        assert_eq!(scheduler.update_job(&record).await, Err(SchedulerError::NotFound(record.id)));
    }

    #[tokio::test]
    async fn stats_tracking() {
        let scheduler = InMemoryScheduler::new();
        for _ in 0..5 {
            scheduler.enqueue_job(ping(), Duration::ZERO).await.unwrap();
        }
        assert_eq!(scheduler.stats().await.unwrap().pending, 5);

        scheduler.dequeue_leased_job().await.unwrap();
        let mut leased = scheduler.dequeue_leased_job().await.unwrap().unwrap();
        leased.mark_canceled();
        scheduler.update_job(&leased).await.unwrap();

        let stats = scheduler.stats().await.unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.canceled, 1);
    }
}
