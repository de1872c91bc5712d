//! Core queue types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use solburn_core::{Address, BatchId, JobId};

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be dispatched
    Pending,
    /// Dispatched to the transfer executor
    Processing,
    /// Transfer confirmed
    Succeeded,
    /// Terminal failure (ownership mismatch or retries exhausted)
    Failed,
    /// Failed, waiting out the retry delay before re-entering the queue
    Retrying,
    /// Removed from the queue by a batch cancellation
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Completed,
}

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// base * retry
    Linear,
    /// base * 2^(retry - 1)
    Exponential,
}

impl std::str::FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!(
                "unknown backoff strategy `{other}` (expected fixed, linear or exponential)"
            )),
        }
    }
}

/// Retry policy applied by the queue processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 = no retries)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Delay cap for growing strategies
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(2, Duration::from_secs(10))
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before the given retry (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(retry).min(self.max_delay),
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(retry - 1);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }

    /// Whether a job that has already been retried `retries` times may be retried again.
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }
}

/// One requested asset transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Owning batch (lookup only)
    pub batch_id: BatchId,
    pub asset_id: String,
    pub owner_address: Address,
    pub destination_address: Address,
    pub status: JobStatus,
    /// Retries consumed so far, never above the policy's `max_retries`
    pub retries: u32,
    /// Last failure message
    pub error: Option<String>,
    pub signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        batch_id: BatchId,
        asset_id: impl Into<String>,
        owner_address: Address,
        destination_address: Address,
        now: DateTime<Utc>,
    ) -> Self {
        let asset_id = asset_id.into();
        Self {
            id: JobId::new(batch_id, &asset_id),
            batch_id,
            asset_id,
            owner_address,
            destination_address,
            status: JobStatus::Pending,
            retries: 0,
            error: None,
            signature: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
    }

    pub fn mark_succeeded(&mut self, signature: Option<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Succeeded;
        self.signature = signature;
        self.error = None;
        self.completed_at = Some(now);
    }

    pub fn mark_retrying(&mut self, error: String) {
        self.status = JobStatus::Retrying;
        self.retries += 1;
        self.error = Some(error);
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
    }

    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.error = Some("batch cancelled".to_string());
        self.completed_at = Some(now);
    }
}

/// Aggregate counters of a batch.
///
/// Always `pending + processing + succeeded + failed == total` and
/// `processed == succeeded + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            pending: total,
            ..Default::default()
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.pending + self.processing + self.succeeded + self.failed == self.total
            && self.processed == self.succeeded + self.failed
    }
}

/// A client-initiated group of jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub owner_address: Address,
    pub destination_address: Address,
    pub asset_ids: Vec<String>,
    pub status: BatchStatus,
    pub stats: BatchStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Mark the batch completed once every job has been processed.
    pub(crate) fn complete_if_done(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == BatchStatus::Pending && self.stats.processed == self.stats.total {
            self.status = BatchStatus::Completed;
            self.completed_at = Some(now);
            return true;
        }
        false
    }
}

/// Per-job line of a batch status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: JobId,
    pub asset_id: String,
    pub status: JobStatus,
    pub retries: u32,
    pub error: Option<String>,
    pub signature: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            asset_id: job.asset_id.clone(),
            status: job.status,
            retries: job.retries,
            error: job.error.clone(),
            signature: job.signature.clone(),
            completed_at: job.completed_at,
        }
    }
}

/// Batch status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub owner_address: Address,
    pub destination_address: Address,
    pub stats: BatchStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Finished jobs of this batch, in completion order
    pub items: Vec<JobView>,
}

/// Batch line of the global queue snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub stats: BatchStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Batch> for BatchSummary {
    fn from(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id,
            status: batch.status,
            stats: batch.stats,
            started_at: batch.started_at,
            completed_at: batch.completed_at,
        }
    }
}

/// Global queue snapshot for operational visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub total_batches: usize,
    /// Jobs waiting in the pending list
    pub queue_length: usize,
    /// Jobs currently in flight
    pub processing: usize,
    /// Jobs waiting out a retry delay
    pub retrying: usize,
    /// Finished jobs still retained
    pub completed: usize,
    pub processor_running: bool,
    pub batches: Vec<BatchSummary>,
}

/// Result of a batch cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelView {
    pub batch_id: BatchId,
    /// Jobs removed before dispatch
    pub cancelled: usize,
    /// Jobs already in flight, left to finish
    pub in_flight: usize,
    pub stats: BatchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        Address::parse("11111111111111111111111111111111").unwrap()
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(500));
    }

    #[test]
    fn default_policy_is_two_fixed_ten_second_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.strategy, BackoffStrategy::Fixed);
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(10));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(500));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let policy = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::fixed(5, Duration::from_millis(100))
        };

        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(300));
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let policy = RetryPolicy::fixed(2, Duration::ZERO);

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }

    #[test]
    fn backoff_strategy_parses_case_insensitively() {
        assert_eq!("Exponential".parse::<BackoffStrategy>(), Ok(BackoffStrategy::Exponential));
        assert!("random".parse::<BackoffStrategy>().is_err());
    }

    #[test]
    fn job_lifecycle() {
        let now = Utc::now();
        let batch = BatchId::new();
        let mut job = Job::new(batch, "A", addr(), addr(), now);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.id, JobId::new(batch, "A"));

        job.mark_processing(now);
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        job.mark_retrying("boom".into());
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.retries, 1);
        assert!(!job.status.is_terminal());

        job.mark_succeeded(Some("sig".into()), now);
        assert!(job.status.is_terminal());
        assert_eq!(job.error, None);
        assert_eq!(job.signature.as_deref(), Some("sig"));
    }

    #[test]
    fn fresh_stats_are_consistent() {
        let stats = BatchStats::new(3);
        assert!(stats.is_consistent());
        assert_eq!(stats.pending, 3);
    }
}
