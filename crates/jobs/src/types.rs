//! Core job types and policies.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job type, routed to a handler by the `JobRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Heartbeat.
    Ping,
    /// Claim every active deal for a newly added card. Payload: `card_id`.
    ClaimDealsForNewCard,
    /// Claim a newly registered deal for every eligible card. Payload: `deal_id`.
    ClaimDealForExistingCards,
}

impl JobType {
    pub const ALL: [JobType; 3] = [
        JobType::Ping,
        JobType::ClaimDealsForNewCard,
        JobType::ClaimDealForExistingCards,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Ping => "ping",
            JobType::ClaimDealsForNewCard => "claim_deals_for_new_card",
            JobType::ClaimDealForExistingCards => "claim_deal_for_existing_cards",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job record lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, waiting to be leased
    Pending,
    /// Leased by a worker
    Running,
    /// Finished (non-recurring, or recurrence exhausted)
    Completed,
    /// Terminal failure; never retried
    Canceled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Canceled)
    }
}

/// Outcome of one orchestrated batch, and of a whole orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    Success,
    /// Transient failure; retried while budget remains, then requeued with backoff.
    NonTerminalError,
    /// Permanent failure; the job is canceled.
    TerminalError,
}

impl ExecutionResult {
    /// Combine two results: Terminal wins over NonTerminal, which wins over Success.
    pub fn combine(self, other: ExecutionResult) -> ExecutionResult {
        use ExecutionResult::*;
        match (self, other) {
            (TerminalError, _) | (_, TerminalError) => TerminalError,
            (NonTerminalError, _) | (_, NonTerminalError) => NonTerminalError,
            (Success, Success) => Success,
        }
    }
}

/// Recurrence of a job: after each successful iteration the record is re-armed
/// `interval` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval: Duration,
    /// Iterations left after the current one; `None` recurs forever.
    pub remaining: Option<u32>,
}

impl Recurrence {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            remaining: None,
        }
    }

    pub fn times(interval: Duration, remaining: u32) -> Self {
        Self {
            interval,
            remaining: Some(remaining),
        }
    }
}

/// Backoff strategy for scheduler-level requeues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between requeues
    Fixed,
    /// Exponential backoff: base * 2^(n-1)
    #[default]
    Exponential,
    /// Linear backoff: base * n
    Linear,
}

/// Scheduler-level backoff policy. Distinct from the orchestrated runner's
/// in-process retry latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Base delay
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.0,
        }
    }

    /// Delay before the `backoff_count`-th requeue becomes visible (1-indexed).
    pub fn delay_for(&self, backoff_count: u32) -> Duration {
        if backoff_count == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi(backoff_count.saturating_sub(1).min(62) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * backoff_count as f64).min(max_ms),
        };

        // Deterministic jitter derived from the count
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((backoff_count as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }
}

/// A queued job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: JobType,
    pub is_orchestrated: bool,
    pub state: JobState,
    pub description: String,
    /// Start of the current (or most recent) lease
    pub start_time: Option<DateTime<Utc>>,
    pub payload: BTreeMap<String, String>,
    /// Number of leases handed out
    pub attempt: u32,
    /// Scheduler-level backoffs since the last success
    pub backoff_count: u32,
    /// Leases that expired without a report since the last report
    #[serde(default)]
    pub lapsed_leases: u32,
    pub recurrence: Option<Recurrence>,
    /// Pending: when the record may be leased. Running: when the lease expires.
    pub visible_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn new(job_type: JobType, is_orchestrated: bool, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type,
            is_orchestrated,
            state: JobState::Pending,
            description: description.into(),
            start_time: None,
            payload: BTreeMap::new(),
            attempt: 0,
            backoff_count: 0,
            lapsed_leases: 0,
            recurrence: None,
            visible_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// A job run once by the simple runner.
    pub fn simple(job_type: JobType, description: impl Into<String>) -> Self {
        Self::new(job_type, false, description)
    }

    /// A job driven by the orchestrated runner.
    pub fn orchestrated(job_type: JobType, description: impl Into<String>) -> Self {
        Self::new(job_type, true, description)
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.payload.insert(key.into(), value.to_string());
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    pub fn payload_value(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }

    /// Mark as leased until `lease_expires_at`.
    pub fn mark_running(&mut self, now: DateTime<Utc>, lease_expires_at: DateTime<Utc>) {
        self.state = JobState::Running;
        self.attempt += 1;
        self.start_time = Some(now);
        self.visible_at = lease_expires_at;
        self.updated_at = now;
    }

    /// Terminal failure: canceled with the payload cleared.
    pub fn mark_canceled(&mut self) {
        self.state = JobState::Canceled;
        self.payload.clear();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(500));

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let policy = BackoffPolicy {
            strategy: BackoffStrategy::Linear,
            ..BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(10))
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_range() {
        let policy = BackoffPolicy {
            jitter: 0.1,
            ..BackoffPolicy::fixed(Duration::from_millis(1000))
        };
        for n in 1..50 {
            let ms = policy.delay_for(n).as_millis();
            assert!((900..=1100).contains(&ms), "delay {ms}ms out of range");
        }
    }

    #[test]
    fn combine_prefers_terminal_then_non_terminal() {
        use ExecutionResult::*;
        assert_eq!(Success.combine(Success), Success);
        assert_eq!(Success.combine(NonTerminalError), NonTerminalError);
        assert_eq!(NonTerminalError.combine(TerminalError), TerminalError);
        assert_eq!(TerminalError.combine(Success), TerminalError);
    }

    #[test]
    fn cancel_clears_payload() {
        let mut record = JobRecord::orchestrated(JobType::ClaimDealsForNewCard, "claim for card")
            .with_payload("card_id", "abc");
        assert_eq!(record.payload_value("card_id"), Some("abc"));

        let now = Utc::now();
        record.mark_running(now, now + chrono::Duration::seconds(30));
        assert_eq!(record.state, JobState::Running);
        assert_eq!(record.attempt, 1);

        record.mark_canceled();
        assert_eq!(record.state, JobState::Canceled);
        assert!(record.payload.is_empty());
    }
}
