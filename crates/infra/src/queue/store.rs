//! In-memory queue state.
//!
//! `QueueStore` is a plain state machine: every method runs to completion
//! and keeps batch counters consistent with job transitions. The service
//! wraps it in a mutex and never holds the lock across an `.await`.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};

use solburn_core::{Address, BatchId, JobId};

use super::types::{
    Batch, BatchStats, BatchStatus, BatchSummary, BatchView, CancelView, Job, JobStatus, JobView,
    QueueSnapshot, RetryPolicy,
};

/// What the processor should do with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Re-enqueue after the delay.
    Retry { retry: u32, delay: std::time::Duration },
    /// The job is finished as failed.
    Terminal,
}

/// Queue store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueStoreError {
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),
    #[error("job is not in flight: {0}")]
    NotInFlight(JobId),
}

#[derive(Debug)]
pub struct QueueStore {
    pending: VecDeque<Job>,
    in_flight: HashSet<JobId>,
    retrying: HashMap<JobId, Job>,
    completed: VecDeque<Job>,
    batches: HashMap<BatchId, Batch>,
    /// Submission order, for snapshots
    batch_order: Vec<BatchId>,
    max_completed: usize,
    processor_running: bool,
}

impl QueueStore {
    pub fn new(max_completed: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashSet::new(),
            retrying: HashMap::new(),
            completed: VecDeque::new(),
            batches: HashMap::new(),
            batch_order: Vec::new(),
            max_completed,
            processor_running: false,
        }
    }

    /// Create a batch and append one pending job per asset.
    ///
    /// Asset ids must be unique within the batch. An empty batch is
    /// completed immediately.
    pub fn submit(
        &mut self,
        owner: Address,
        destination: Address,
        asset_ids: Vec<String>,
        now: DateTime<Utc>,
    ) -> BatchId {
        let batch_id = BatchId::new();

        for asset_id in &asset_ids {
            self.pending.push_back(Job::new(
                batch_id,
                asset_id.clone(),
                owner.clone(),
                destination.clone(),
                now,
            ));
        }

        let mut batch = Batch {
            id: batch_id,
            owner_address: owner,
            destination_address: destination,
            stats: BatchStats::new(asset_ids.len()),
            asset_ids,
            status: BatchStatus::Pending,
            started_at: now,
            completed_at: None,
            cancelled_at: None,
        };
        batch.complete_if_done(now);

        self.batches.insert(batch_id, batch);
        self.batch_order.push(batch_id);
        batch_id
    }

    /// Pop the head of the pending list if fewer than `concurrency` jobs are in flight.
    pub fn next_dispatch(&mut self, concurrency: usize, now: DateTime<Utc>) -> Option<Job> {
        if self.in_flight.len() >= concurrency.max(1) {
            return None;
        }

        let mut job = self.pending.pop_front()?;
        job.mark_processing(now);
        self.in_flight.insert(job.id.clone());

        if let Some(batch) = self.batches.get_mut(&job.batch_id) {
            batch.stats.pending = batch.stats.pending.saturating_sub(1);
            batch.stats.processing += 1;
        }

        Some(job)
    }

    /// Record a confirmed transfer.
    pub fn record_success(
        &mut self,
        mut job: Job,
        signature: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueStoreError> {
        self.take_in_flight(&job.id)?;
        job.mark_succeeded(signature, now);

        if let Some(batch) = self.batches.get_mut(&job.batch_id) {
            batch.stats.processing = batch.stats.processing.saturating_sub(1);
            batch.stats.succeeded += 1;
            batch.stats.processed += 1;
            batch.complete_if_done(now);
        }

        self.push_completed(job);
        Ok(())
    }

    /// Record a failed attempt and decide whether it is retried.
    ///
    /// A retried job counts as pending again right away, so batch counters
    /// stay balanced while it waits out the delay. Jobs of a cancelled batch
    /// are never retried.
    pub fn record_failure(
        &mut self,
        mut job: Job,
        error: String,
        retryable: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureDisposition, QueueStoreError> {
        self.take_in_flight(&job.id)?;

        let batch = self.batches.get_mut(&job.batch_id);
        let cancelled = batch.as_ref().is_some_and(|b| b.cancelled_at.is_some());
        let retry = retryable && !cancelled && policy.should_retry(job.retries);

        if retry {
            job.mark_retrying(error);
            let disposition = FailureDisposition::Retry {
                retry: job.retries,
                delay: policy.delay_for_retry(job.retries),
            };
            if let Some(batch) = batch {
                batch.stats.processing = batch.stats.processing.saturating_sub(1);
                batch.stats.pending += 1;
            }
            self.retrying.insert(job.id.clone(), job);
            return Ok(disposition);
        }

        job.mark_failed(error, now);
        if let Some(batch) = batch {
            batch.stats.processing = batch.stats.processing.saturating_sub(1);
            batch.stats.failed += 1;
            batch.stats.processed += 1;
            batch.complete_if_done(now);
        }
        self.push_completed(job);
        Ok(FailureDisposition::Terminal)
    }

    /// Move a job that finished its retry delay to the tail of the pending list.
    ///
    /// Returns `false` if the job is no longer waiting (e.g. its batch was cancelled).
    pub fn requeue(&mut self, job_id: &JobId) -> bool {
        match self.retrying.remove(job_id) {
            Some(mut job) => {
                job.status = JobStatus::Pending;
                self.pending.push_back(job);
                true
            }
            None => false,
        }
    }

    /// Cancel every job of a batch that has not been dispatched yet.
    pub fn cancel_batch(
        &mut self,
        batch_id: BatchId,
        now: DateTime<Utc>,
    ) -> Result<CancelView, QueueStoreError> {
        if !self.batches.contains_key(&batch_id) {
            return Err(QueueStoreError::BatchNotFound(batch_id));
        }

        let (mut removed, kept): (Vec<Job>, Vec<Job>) = self
            .pending
            .drain(..)
            .partition(|job| job.batch_id == batch_id);
        self.pending = kept.into();

        let waiting: Vec<JobId> = self
            .retrying
            .values()
            .filter(|job| job.batch_id == batch_id)
            .map(|job| job.id.clone())
            .collect();
        for id in waiting {
            if let Some(job) = self.retrying.remove(&id) {
                removed.push(job);
            }
        }

        let cancelled = removed.len();

        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(QueueStoreError::BatchNotFound(batch_id))?;
        if batch.status == BatchStatus::Pending {
            batch.cancelled_at.get_or_insert(now);
        }
        batch.stats.pending = batch.stats.pending.saturating_sub(cancelled);
        batch.stats.failed += cancelled;
        batch.stats.processed += cancelled;
        batch.complete_if_done(now);
        // Retrying jobs count as pending, so `processing` is exactly what is in flight.
        let in_flight = batch.stats.processing;
        let stats = batch.stats;

        for mut job in removed {
            job.mark_cancelled(now);
            self.push_completed(job);
        }

        Ok(CancelView {
            batch_id,
            cancelled,
            in_flight,
            stats,
        })
    }

    pub fn batch_view(&self, batch_id: BatchId) -> Result<BatchView, QueueStoreError> {
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or(QueueStoreError::BatchNotFound(batch_id))?;

        let items = self
            .completed
            .iter()
            .filter(|job| job.batch_id == batch_id)
            .map(JobView::from)
            .collect();

        Ok(BatchView {
            batch_id,
            status: batch.status,
            owner_address: batch.owner_address.clone(),
            destination_address: batch.destination_address.clone(),
            stats: batch.stats,
            started_at: batch.started_at,
            completed_at: batch.completed_at,
            cancelled_at: batch.cancelled_at,
            items,
        })
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            total_batches: self.batches.len(),
            queue_length: self.pending.len(),
            processing: self.in_flight.len(),
            retrying: self.retrying.len(),
            completed: self.completed.len(),
            processor_running: self.processor_running,
            batches: self
                .batch_order
                .iter()
                .filter_map(|id| self.batches.get(id))
                .map(BatchSummary::from)
                .collect(),
        }
    }

    /// No pending, in-flight or retrying jobs.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty() && self.retrying.is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Flag the processor as running. Returns `true` if the caller must start it.
    pub fn claim_processor(&mut self) -> bool {
        if self.processor_running || self.is_idle() {
            return false;
        }
        self.processor_running = true;
        true
    }

    /// Flag the processor as stopped if there is nothing left to do.
    pub fn release_processor_if_idle(&mut self) -> bool {
        if self.is_idle() {
            self.processor_running = false;
            return true;
        }
        false
    }

    fn take_in_flight(&mut self, job_id: &JobId) -> Result<(), QueueStoreError> {
        if self.in_flight.remove(job_id) {
            Ok(())
        } else {
            Err(QueueStoreError::NotInFlight(job_id.clone()))
        }
    }

    fn push_completed(&mut self, job: Job) {
        self.completed.push_back(job);
        while self.completed.len() > self.max_completed {
            self.completed.pop_front();
        }
    }
}
