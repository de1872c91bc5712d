//! Queue service: submission, status and the sequential processor.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use solburn_core::{Address, BatchId, DomainError, JobId};

use crate::transfer::{TransferError, TransferReceipt};

use super::store::{FailureDisposition, QueueStore, QueueStoreError};
use super::types::{BatchStatus, BatchView, CancelView, Job, QueueSnapshot, RetryPolicy};

/// Work the processor performs for one job.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<TransferReceipt, TransferError>;
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Pause after every dispatch before the next one is considered
    pub processing_delay: Duration,
    /// Poll interval while the concurrency ceiling is reached
    pub poll_interval: Duration,
    /// Maximum in-flight jobs across all batches
    pub batch_concurrency: usize,
    pub retry: RetryPolicy,
    /// Retention cap for finished job records
    pub max_completed_jobs: usize,
    /// Used when a submission names no destination
    pub default_destination: Option<Address>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_millis(5_000),
            poll_interval: Duration::from_millis(1_000),
            batch_concurrency: 1,
            retry: RetryPolicy::default(),
            max_completed_jobs: 10_000,
            default_destination: None,
        }
    }
}

impl QueueConfig {
    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_concurrency(mut self, max: usize) -> Self {
        self.batch_concurrency = max.max(1);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_max_completed_jobs(mut self, max: usize) -> Self {
        self.max_completed_jobs = max;
        self
    }

    pub fn with_default_destination(mut self, destination: Address) -> Self {
        self.default_destination = Some(destination);
        self
    }
}

/// Queue service error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),
    #[error(transparent)]
    Validation(#[from] DomainError),
}

impl From<QueueStoreError> for QueueError {
    fn from(err: QueueStoreError) -> Self {
        match err {
            QueueStoreError::BatchNotFound(id) => QueueError::BatchNotFound(id),
            other => QueueError::Validation(DomainError::validation(other.to_string())),
        }
    }
}

struct Inner {
    config: QueueConfig,
    handler: Arc<dyn JobHandler>,
    store: Mutex<QueueStore>,
}

/// Owns the queue state and its processor. Cheap to clone.
///
/// Must be used from within a tokio runtime: submissions spawn the processor.
#[derive(Clone)]
pub struct QueueService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl QueueService {
    pub fn new(config: QueueConfig, handler: Arc<dyn JobHandler>) -> Self {
        let store = QueueStore::new(config.max_completed_jobs);
        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                store: Mutex::new(store),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Validate a request, create its batch and make sure the processor runs.
    pub fn submit_batch(
        &self,
        owner: &str,
        asset_ids: Vec<String>,
        destination: Option<&str>,
    ) -> Result<BatchId, QueueError> {
        let owner = Address::parse(owner)?;
        let destination = match destination.filter(|d| !d.trim().is_empty()) {
            Some(d) => Address::parse(d)?,
            None => self
                .inner
                .config
                .default_destination
                .clone()
                .ok_or_else(|| DomainError::validation("destination address is required"))?,
        };

        let mut seen = HashSet::with_capacity(asset_ids.len());
        let mut assets = Vec::with_capacity(asset_ids.len());
        for raw in &asset_ids {
            let asset = Address::parse(raw)?;
            if !seen.insert(asset.clone()) {
                return Err(DomainError::validation(format!("duplicate asset id {asset}")).into());
            }
            assets.push(String::from(asset));
        }

        let total = assets.len();
        let (batch_id, start) = {
            let mut store = self.inner.lock_store();
            let batch_id = store.submit(owner.clone(), destination.clone(), assets, Utc::now());
            (batch_id, store.claim_processor())
        };

        info!(
            %batch_id,
            owner = %owner,
            destination = %destination,
            total,
            "batch submitted"
        );

        if start {
            tokio::spawn(run_processor(self.inner.clone()));
        }
        Ok(batch_id)
    }

    pub fn batch_status(&self, batch_id: BatchId) -> Result<BatchView, QueueError> {
        Ok(self.inner.lock_store().batch_view(batch_id)?)
    }

    pub fn queue_status(&self) -> QueueSnapshot {
        self.inner.lock_store().snapshot()
    }

    /// Cancel the jobs of a batch that have not been dispatched yet.
    pub fn cancel_batch(&self, batch_id: BatchId) -> Result<CancelView, QueueError> {
        let view = self.inner.lock_store().cancel_batch(batch_id, Utc::now())?;
        info!(
            %batch_id,
            cancelled = view.cancelled,
            in_flight = view.in_flight,
            "batch cancelled"
        );
        Ok(view)
    }

    /// Poll until the batch is completed.
    pub async fn wait_for_batch(
        &self,
        batch_id: BatchId,
        poll: Duration,
    ) -> Result<BatchView, QueueError> {
        loop {
            let view = self.batch_status(batch_id)?;
            if view.status == BatchStatus::Completed {
                return Ok(view);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

impl Inner {
    fn lock_store(&self) -> MutexGuard<'_, QueueStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(self: &Arc<Self>, job: Job, result: Result<TransferReceipt, TransferError>) {
        let now = Utc::now();
        let job_id = job.id.clone();
        let asset_id = job.asset_id.clone();
        let batch_id = job.batch_id;

        let mut store = self.lock_store();
        match result {
            Ok(receipt) => match store.record_success(job, receipt.signature.clone(), now) {
                Ok(()) => info!(
                    %batch_id,
                    %job_id,
                    asset_id = %asset_id,
                    signature = ?receipt.signature,
                    "job succeeded"
                ),
                Err(e) => error!(%job_id, error = %e, "failed to record job success"),
            },
            Err(err) => {
                let disposition = store.record_failure(
                    job,
                    err.to_string(),
                    err.is_retryable(),
                    &self.config.retry,
                    now,
                );
                match disposition {
                    Ok(FailureDisposition::Retry { retry, delay }) => {
                        warn!(
                            %batch_id,
                            %job_id,
                            asset_id = %asset_id,
                            retries = retry,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "job failed, retry scheduled"
                        );
                        self.schedule_requeue(job_id, delay);
                    }
                    Ok(FailureDisposition::Terminal) => warn!(
                        %batch_id,
                        %job_id,
                        asset_id = %asset_id,
                        error = %err,
                        "job failed"
                    ),
                    Err(e) => error!(%job_id, error = %e, "failed to record job failure"),
                }
            }
        }
    }

    fn schedule_requeue(self: &Arc<Self>, job_id: JobId, delay: Duration) {
        let inner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let start = {
                let mut store = inner.lock_store();
                if !store.requeue(&job_id) {
                    debug!(%job_id, "retry dropped, job no longer waiting");
                }
                store.claim_processor()
            };
            if start {
                tokio::spawn(run_processor(inner));
            }
        });
    }
}

enum Step {
    Dispatch(Job),
    Wait,
    Stop,
}

async fn run_processor(inner: Arc<Inner>) {
    let config = &inner.config;
    info!(
        concurrency = config.batch_concurrency,
        processing_delay_ms = config.processing_delay.as_millis() as u64,
        "transfer queue processor started"
    );

    loop {
        let step = {
            let mut store = inner.lock_store();
            match store.next_dispatch(config.batch_concurrency, Utc::now()) {
                Some(job) => Step::Dispatch(job),
                None if store.release_processor_if_idle() => Step::Stop,
                None => Step::Wait,
            }
        };

        match step {
            Step::Dispatch(job) => {
                debug!(
                    batch_id = %job.batch_id,
                    job_id = %job.id,
                    asset_id = %job.asset_id,
                    retries = job.retries,
                    "dispatching job"
                );
                dispatch(inner.clone(), job);
                tokio::time::sleep(config.processing_delay).await;
            }
            Step::Wait => tokio::time::sleep(config.poll_interval).await,
            Step::Stop => break,
        }
    }

    info!("transfer queue processor idle");
}

/// Run the handler on its own task so a panic is contained to this job.
fn dispatch(inner: Arc<Inner>, job: Job) {
    tokio::spawn(async move {
        let handler = inner.handler.clone();
        let attempt = job.clone();
        let result = match tokio::spawn(async move { handler.handle(&attempt).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "transfer task aborted");
                Err(TransferError::Unexpected(e.to_string()))
            }
        };
        inner.finish(job, result);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::queue::types::{BatchStats, JobStatus};

    const OWNER: &str = "So11111111111111111111111111111111111111112";
    const DEST: &str = "11111111111111111111111111111111";

    fn asset(n: u8) -> String {
        bs58::encode([n; 32]).into_string()
    }

    enum Scripted {
        Fail(TransferError),
        Panic,
    }

    /// Succeeds unless a failure is scripted for the asset.
    #[derive(Default)]
    struct ScriptedHandler {
        script: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: Mutex<Vec<String>>,
        work: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedHandler {
        fn taking(work: Duration) -> Self {
            Self {
                work,
                ..Default::default()
            }
        }

        fn script(self, asset_id: &str, steps: Vec<Scripted>) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(asset_id.to_string(), steps.into());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, job: &Job) -> Result<TransferReceipt, TransferError> {
            self.calls.lock().unwrap().push(job.asset_id.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let step = self
                .script
                .lock()
                .unwrap()
                .get_mut(&job.asset_id)
                .and_then(VecDeque::pop_front);
            match step {
                None => Ok(TransferReceipt {
                    signature: Some(format!("sig-{}", job.asset_id)),
                }),
                Some(Scripted::Fail(e)) => Err(e),
                Some(Scripted::Panic) => panic!("handler blew up"),
            }
        }
    }

    fn service(handler: Arc<ScriptedHandler>) -> QueueService {
        QueueService::new(QueueConfig::default(), handler)
    }

    async fn wait(svc: &QueueService, id: BatchId) -> BatchView {
        tokio::time::timeout(
            Duration::from_secs(3_600),
            svc.wait_for_batch(id, Duration::from_millis(250)),
        )
        .await
        .expect("batch did not complete")
        .unwrap()
    }

    fn submission_error() -> TransferError {
        TransferError::Submission("stale proof".into())
    }

    #[tokio::test(start_paused = true)]
    async fn all_transfers_succeed() {
        let handler = Arc::new(ScriptedHandler::default());
        let svc = service(handler.clone());

        let id = svc
            .submit_batch(OWNER, vec![asset(1), asset(2), asset(3)], Some(DEST))
            .unwrap();
        let view = wait(&svc, id).await;

        assert_eq!(view.status, BatchStatus::Completed);
        assert_eq!(
            view.stats,
            BatchStats {
                total: 3,
                pending: 0,
                processing: 0,
                processed: 3,
                succeeded: 3,
                failed: 0
            }
        );
        assert!(view.items.iter().all(|i| i.status == JobStatus::Succeeded));
        assert_eq!(view.items[0].signature, Some(format!("sig-{}", asset(1))));
        // Reads without new activity are stable.
        assert_eq!(svc.batch_status(id).unwrap(), view);
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_complete_in_submission_order() {
        let handler = Arc::new(ScriptedHandler::default());
        let svc = service(handler.clone());
        let assets: Vec<String> = (1..=5).map(asset).collect();

        let id = svc.submit_batch(OWNER, assets.clone(), Some(DEST)).unwrap();
        let view = wait(&svc, id).await;

        let done: Vec<String> = view.items.into_iter().map(|i| i.asset_id).collect();
        assert_eq!(done, assets);
        assert_eq!(handler.calls(), assets);
    }

    #[tokio::test(start_paused = true)]
    async fn ownership_mismatch_fails_without_retry() {
        let mismatch = TransferError::OwnershipMismatch {
            expected: OWNER.into(),
            actual: DEST.into(),
        };
        let handler = Arc::new(ScriptedHandler::default().script(&asset(1), vec![Scripted::Fail(mismatch)]));
        let svc = service(handler.clone());

        let id = svc.submit_batch(OWNER, vec![asset(1)], Some(DEST)).unwrap();
        let view = wait(&svc, id).await;

        let item = &view.items[0];
        assert_eq!(item.status, JobStatus::Failed);
        assert_eq!(item.retries, 0);
        assert!(item.error.as_deref().unwrap().contains("ownership mismatch"));
        assert_eq!(handler.calls().len(), 1);
        assert_eq!(view.stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let handler = Arc::new(ScriptedHandler::default().script(
            &asset(1),
            vec![Scripted::Fail(submission_error()), Scripted::Fail(submission_error())],
        ));
        let svc = service(handler.clone());

        let id = svc.submit_batch(OWNER, vec![asset(1)], Some(DEST)).unwrap();
        let view = wait(&svc, id).await;

        let item = &view.items[0];
        assert_eq!(item.status, JobStatus::Succeeded);
        assert_eq!(item.retries, 2);
        assert_eq!(item.error, None);
        assert_eq!(handler.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let handler = Arc::new(ScriptedHandler::default().script(
            &asset(1),
            (0..10).map(|_| Scripted::Fail(submission_error())).collect(),
        ));
        let svc = service(handler.clone());

        let id = svc.submit_batch(OWNER, vec![asset(1)], Some(DEST)).unwrap();
        let view = wait(&svc, id).await;

        let item = &view.items[0];
        assert_eq!(item.status, JobStatus::Failed);
        assert_eq!(item.retries, svc.config().retry.max_retries);
        assert!(item.error.as_deref().unwrap().contains("stale proof"));
        assert_eq!(handler.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retried_job_goes_to_the_tail() {
        let handler = Arc::new(ScriptedHandler::default().script(&asset(1), vec![Scripted::Fail(submission_error())]));
        let svc = QueueService::new(
            QueueConfig::default().with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(100))),
            handler.clone(),
        );

        let id = svc
            .submit_batch(OWNER, vec![asset(1), asset(2)], Some(DEST))
            .unwrap();
        wait(&svc, id).await;

        assert_eq!(handler.calls(), vec![asset(1), asset(2), asset(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_is_completed_immediately() {
        let svc = service(Arc::new(ScriptedHandler::default()));

        let id = svc.submit_batch(OWNER, vec![], Some(DEST)).unwrap();
        let view = svc.batch_status(id).unwrap();

        assert_eq!(view.status, BatchStatus::Completed);
        assert_eq!(view.stats.total, 0);
        assert!(!svc.queue_status().processor_running);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_batches_share_the_concurrency_ceiling() {
        // Each transfer outlasts the processing delay, so a second dispatch
        // would overlap if the ceiling were ignored.
        let handler = Arc::new(ScriptedHandler::taking(Duration::from_secs(7)));
        let svc = service(handler.clone());

        let a = svc.submit_batch(OWNER, vec![asset(1), asset(2)], Some(DEST)).unwrap();
        let b = svc.submit_batch(OWNER, vec![asset(3), asset(4)], Some(DEST)).unwrap();
        wait(&svc, a).await;
        wait(&svc, b).await;

        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
        // Both batches feed one FIFO.
        assert_eq!(handler.calls(), vec![asset(1), asset(2), asset(3), asset(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn higher_concurrency_allows_overlap() {
        let handler = Arc::new(ScriptedHandler::taking(Duration::from_secs(12)));
        let svc = QueueService::new(QueueConfig::default().with_batch_concurrency(2), handler.clone());

        let id = svc
            .submit_batch(OWNER, (1..=4).map(asset).collect(), Some(DEST))
            .unwrap();
        wait(&svc, id).await;

        assert_eq!(handler.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_stay_consistent_while_processing() {
        let handler = Arc::new(ScriptedHandler::taking(Duration::from_secs(2)).script(
            &asset(2),
            vec![Scripted::Fail(submission_error())],
        ));
        let svc = service(handler);

        let id = svc
            .submit_batch(OWNER, (1..=3).map(asset).collect(), Some(DEST))
            .unwrap();

        loop {
            let view = svc.batch_status(id).unwrap();
            assert!(view.stats.is_consistent(), "{:?}", view.stats);
            assert_eq!(
                view.status == BatchStatus::Completed,
                view.stats.processed == view.stats.total
            );
            if view.status == BatchStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_handler_does_not_stop_the_processor() {
        let handler = Arc::new(ScriptedHandler::default().script(
            &asset(1),
            vec![Scripted::Panic, Scripted::Panic, Scripted::Panic],
        ));
        let svc = service(handler.clone());

        let id = svc
            .submit_batch(OWNER, vec![asset(1), asset(2)], Some(DEST))
            .unwrap();
        let view = wait(&svc, id).await;

        assert_eq!(view.stats.succeeded, 1);
        assert_eq!(view.stats.failed, 1);
        let failed = view.items.iter().find(|i| i.asset_id == asset(1)).unwrap();
        assert!(failed.error.as_deref().unwrap().contains("unexpected transfer failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_skips_undispatched_jobs() {
        let handler = Arc::new(ScriptedHandler::taking(Duration::from_secs(3)));
        let svc = service(handler.clone());

        let id = svc
            .submit_batch(OWNER, (1..=3).map(asset).collect(), Some(DEST))
            .unwrap();
        // The first job is dispatched synchronously by the processor's first pass.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let cancel = svc.cancel_batch(id).unwrap();
        assert_eq!(cancel.cancelled, 2);
        assert_eq!(cancel.in_flight, 1);

        let view = wait(&svc, id).await;
        assert_eq!(view.stats.succeeded, 1);
        assert_eq!(view.stats.failed, 2);
        assert!(view.cancelled_at.is_some());
        assert_eq!(handler.calls(), vec![asset(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_batch_does_not_retry_its_in_flight_job() {
        let handler = Arc::new(
            ScriptedHandler::taking(Duration::from_secs(3))
                .script(&asset(1), vec![Scripted::Fail(submission_error())]),
        );
        let svc = service(handler.clone());

        let id = svc
            .submit_batch(OWNER, vec![asset(1), asset(2)], Some(DEST))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let cancel = svc.cancel_batch(id).unwrap();
        assert_eq!((cancel.cancelled, cancel.in_flight), (1, 1));

        let view = wait(&svc, id).await;
        // Let any stray retry timer fire.
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(handler.calls(), vec![asset(1)]);
        assert_eq!(view.stats.succeeded, 0);
        assert_eq!(view.stats.failed, 2);
        let first = view.items.iter().find(|i| i.asset_id == asset(1)).unwrap();
        assert_eq!(first.status, JobStatus::Failed);
        assert_eq!(first.retries, 0);
        assert!(!svc.queue_status().processor_running);
    }

    #[tokio::test(start_paused = true)]
    async fn processor_restarts_for_later_submissions() {
        let handler = Arc::new(ScriptedHandler::default());
        let svc = service(handler.clone());

        let first = svc.submit_batch(OWNER, vec![asset(1)], Some(DEST)).unwrap();
        wait(&svc, first).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!svc.queue_status().processor_running);

        let second = svc.submit_batch(OWNER, vec![asset(2)], Some(DEST)).unwrap();
        assert!(svc.queue_status().processor_running);
        wait(&svc, second).await;

        let snapshot = svc.queue_status();
        assert_eq!(snapshot.total_batches, 2);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.queue_length, 0);
    }

    #[tokio::test]
    async fn default_destination_is_used_when_omitted() {
        let svc = QueueService::new(
            QueueConfig::default().with_default_destination(Address::parse(DEST).unwrap()),
            Arc::new(ScriptedHandler::default()),
        );

        let id = svc.submit_batch(OWNER, vec![], None).unwrap();
        assert_eq!(svc.batch_status(id).unwrap().destination_address.as_str(), DEST);
    }

    #[tokio::test]
    async fn invalid_submissions_are_rejected() {
        let svc = service(Arc::new(ScriptedHandler::default()));

        assert!(matches!(
            svc.submit_batch("not-an-address", vec![asset(1)], Some(DEST)),
            Err(QueueError::Validation(_))
        ));
        assert!(matches!(
            svc.submit_batch(OWNER, vec![asset(1)], None),
            Err(QueueError::Validation(DomainError::Validation(_)))
        ));
        assert!(matches!(
            svc.submit_batch(OWNER, vec![asset(1), asset(1)], Some(DEST)),
            Err(QueueError::Validation(_))
        ));
        assert_eq!(svc.queue_status().total_batches, 0);
    }

    #[tokio::test]
    async fn unknown_batch_is_not_found() {
        let svc = service(Arc::new(ScriptedHandler::default()));
        let id = BatchId::new();

        assert_eq!(svc.batch_status(id), Err(QueueError::BatchNotFound(id)));
        assert_eq!(svc.cancel_batch(id).unwrap_err(), QueueError::BatchNotFound(id));
    }
}
