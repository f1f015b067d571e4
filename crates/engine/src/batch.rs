//! Batch execution with partial-failure semantics.
//!
//! A batch drives the [`QueryExecutor`] over N related mutations in one of
//! two modes:
//!
//! - **Sequential**: one request in flight at a time, results in input order.
//! - **Parallel-chunked**: requests are split into chunks of
//!   [`BatchConfig::batch_size`]; every request of a chunk runs concurrently
//!   on a [`JoinSet`] and the chunk fully settles before the next starts.
//!   Settled results are re-sorted by input index, so output order always
//!   matches input order.
//!
//! With `continue_on_error` every failure is captured into its item result.
//! Without it the first failure (in input order) aborts the batch and is
//! returned; in parallel mode the failing chunk still settles first.
//!
//! Progress of a running batch is published on a `watch` channel and can be
//! polled with [`BatchExecutor::progress`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use protocol::{BatchConfig, BatchJobId, OperationName, Request, Timestamp, ToolkitError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::executor::QueryExecutor;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The bulk operation a batch performs. Used for logging and session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Bulk create.
    Create,
    /// Bulk update.
    Update,
    /// Bulk delete.
    Delete,
    /// Bulk workflow-state transition.
    Transition,
}

impl BatchKind {
    /// Returns the lowercase name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Transition => "transition",
        }
    }

    fn operation_name(self) -> OperationName {
        OperationName::new(format!("batch_{}", self.as_str()))
            .unwrap_or_else(OperationName::anonymous)
    }
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call batch options.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Run chunks concurrently instead of one item at a time.
    pub parallel: bool,
    /// Capture failures per item instead of aborting the batch.
    pub continue_on_error: bool,
    /// Overrides the configured chunk size for this call.
    pub batch_size: Option<usize>,
    /// Id to publish progress under; generated when `None`. Must not belong
    /// to a batch that is still running.
    pub job_id: Option<BatchJobId>,
}

impl BatchOptions {
    /// One item at a time.
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Concurrent chunks of the configured size.
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    /// Sets `continue_on_error`.
    #[must_use]
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Sets the chunk size for this call.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Publishes progress under `job_id`.
    #[must_use]
    pub fn with_job_id(mut self, job_id: BatchJobId) -> Self {
        self.job_id = Some(job_id);
        self
    }
}

/// Live counters of one batch.
///
/// Once `in_progress` is `false`, `completed == successful + failed`; for a
/// batch that ran to completion `completed == total` as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Batch identifier.
    pub job_id: BatchJobId,
    /// Bulk operation performed.
    pub kind: BatchKind,
    /// Items submitted.
    pub total: usize,
    /// Items settled so far.
    pub completed: usize,
    /// Items that succeeded.
    pub successful: usize,
    /// Items that failed.
    pub failed: usize,
    /// `false` once the batch has finished or aborted.
    pub in_progress: bool,
}

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Position of the item in the submitted list.
    pub index: usize,
    /// Response `data` on success (`null` when absent), or the error.
    pub outcome: Result<Value, ToolkitError>,
    /// Settlement time.
    pub timestamp: Timestamp,
}

impl BatchItemResult {
    /// Returns `true` if the item succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the response data of a successful item.
    pub fn data(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    /// Returns the error of a failed item.
    pub fn error(&self) -> Option<&ToolkitError> {
        self.outcome.as_ref().err()
    }
}

/// Aggregate result of a batch call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Batch identifier.
    pub job_id: BatchJobId,
    /// Bulk operation performed.
    pub kind: BatchKind,
    /// Items submitted.
    pub total: usize,
    /// Items that succeeded.
    pub successful: usize,
    /// Items that failed.
    pub failed: usize,
    /// One result per item, in input order.
    pub results: Vec<BatchItemResult>,
}

// ---------------------------------------------------------------------------
// Progress tracking
// ---------------------------------------------------------------------------

type JobTable = Arc<Mutex<HashMap<BatchJobId, watch::Receiver<BatchProgress>>>>;

#[derive(Clone)]
struct ProgressTracker {
    sender: Arc<watch::Sender<BatchProgress>>,
}

impl ProgressTracker {
    fn settle(&self, success: bool) {
        self.sender.send_modify(|progress| {
            progress.completed += 1;
            if success {
                progress.successful += 1;
            } else {
                progress.failed += 1;
            }
        });
    }

    fn snapshot(&self) -> BatchProgress {
        *self.sender.borrow()
    }
}

/// Removes the job from the table and marks it finished, however the batch
/// call exits.
struct JobRegistration {
    job_id: BatchJobId,
    jobs: JobTable,
    tracker: ProgressTracker,
}

impl Drop for JobRegistration {
    fn drop(&mut self) {
        self.tracker
            .sender
            .send_modify(|progress| progress.in_progress = false);
        lock_jobs(&self.jobs).remove(&self.job_id);
    }
}

fn lock_jobs(
    jobs: &Mutex<HashMap<BatchJobId, watch::Receiver<BatchProgress>>>,
) -> MutexGuard<'_, HashMap<BatchJobId, watch::Receiver<BatchProgress>>> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs bulk operations through a shared [`QueryExecutor`].
#[derive(Debug)]
pub struct BatchExecutor {
    executor: Arc<QueryExecutor>,
    batch_size: usize,
    jobs: JobTable,
}

impl BatchExecutor {
    /// Creates a batch executor using `config.batch_size` as the default chunk size.
    pub fn new(executor: Arc<QueryExecutor>, config: &BatchConfig) -> Self {
        Self {
            executor,
            batch_size: config.batch_size.max(1),
            jobs: Arc::default(),
        }
    }

    /// Bulk create.
    pub async fn batch_create(
        &self,
        items: Vec<Request>,
        options: BatchOptions,
    ) -> Result<BatchSummary, ToolkitError> {
        self.run(BatchKind::Create, items, options).await
    }

    /// Bulk update.
    pub async fn batch_update(
        &self,
        items: Vec<Request>,
        options: BatchOptions,
    ) -> Result<BatchSummary, ToolkitError> {
        self.run(BatchKind::Update, items, options).await
    }

    /// Bulk delete.
    pub async fn batch_delete(
        &self,
        items: Vec<Request>,
        options: BatchOptions,
    ) -> Result<BatchSummary, ToolkitError> {
        self.run(BatchKind::Delete, items, options).await
    }

    /// Bulk workflow-state transition.
    pub async fn batch_transition(
        &self,
        items: Vec<Request>,
        options: BatchOptions,
    ) -> Result<BatchSummary, ToolkitError> {
        self.run(BatchKind::Transition, items, options).await
    }

    /// Current counters of a running batch.
    pub fn progress(&self, job_id: BatchJobId) -> Option<BatchProgress> {
        lock_jobs(&self.jobs)
            .get(&job_id)
            .map(|receiver| *receiver.borrow())
    }

    /// Receiver that observes every progress update of a running batch.
    pub fn subscribe(&self, job_id: BatchJobId) -> Option<watch::Receiver<BatchProgress>> {
        lock_jobs(&self.jobs).get(&job_id).cloned()
    }

    /// Counters of every running batch.
    pub fn active_jobs(&self) -> Vec<BatchProgress> {
        lock_jobs(&self.jobs)
            .values()
            .map(|receiver| *receiver.borrow())
            .collect()
    }

    /// Runs `items` as one batch of `kind`.
    ///
    /// Fails with [`ToolkitError::Configuration`] before sending anything when
    /// `options.job_id` names a batch that is still running.
    pub async fn run(
        &self,
        kind: BatchKind,
        items: Vec<Request>,
        options: BatchOptions,
    ) -> Result<BatchSummary, ToolkitError> {
        let job_id = options.job_id.unwrap_or_default();
        let total = items.len();
        let (sender, receiver) = watch::channel(BatchProgress {
            job_id,
            kind,
            total,
            completed: 0,
            successful: 0,
            failed: 0,
            in_progress: true,
        });
        {
            let mut jobs = lock_jobs(&self.jobs);
            if jobs.contains_key(&job_id) {
                return Err(ToolkitError::configuration(format!(
                    "batch job {job_id} is already running"
                )));
            }
            jobs.insert(job_id, receiver);
        }
        let registration = JobRegistration {
            job_id,
            jobs: Arc::clone(&self.jobs),
            tracker: ProgressTracker {
                sender: Arc::new(sender),
            },
        };

        let chunk_size = options.batch_size.unwrap_or(self.batch_size).max(1);
        info!(
            job_id = %job_id,
            kind = %kind,
            total,
            parallel = options.parallel,
            continue_on_error = options.continue_on_error,
            chunk_size,
            "batch started"
        );

        let started = Instant::now();
        let outcome = if options.parallel {
            self.run_chunked(items, chunk_size, options.continue_on_error, &registration.tracker)
                .await
        } else {
            self.run_sequential(items, options.continue_on_error, &registration.tracker)
                .await
        };
        self.record(kind, outcome.is_ok(), started.elapsed());

        let progress = registration.tracker.snapshot();
        drop(registration);

        let results = outcome?;
        info!(
            job_id = %job_id,
            kind = %kind,
            successful = progress.successful,
            failed = progress.failed,
            "batch finished"
        );
        Ok(BatchSummary {
            job_id,
            kind,
            total,
            successful: progress.successful,
            failed: progress.failed,
            results,
        })
    }

    async fn run_sequential(
        &self,
        items: Vec<Request>,
        continue_on_error: bool,
        tracker: &ProgressTracker,
    ) -> Result<Vec<BatchItemResult>, ToolkitError> {
        let mut results = Vec::with_capacity(items.len());
        for (index, request) in items.iter().enumerate() {
            let outcome = self.executor.execute(request).await;
            let settled_at = Timestamp::now();
            tracker.settle(outcome.is_ok());
            match outcome {
                Ok(response) => results.push(item_result(index, Ok(response.data), settled_at)),
                Err(err) if continue_on_error => {
                    warn!(index, error = %err, "batch item failed; continuing");
                    results.push(item_result(index, Err(err), settled_at));
                }
                Err(err) => {
                    error!(index, error = %err, "batch item failed; aborting batch");
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    async fn run_chunked(
        &self,
        items: Vec<Request>,
        chunk_size: usize,
        continue_on_error: bool,
        tracker: &ProgressTracker,
    ) -> Result<Vec<BatchItemResult>, ToolkitError> {
        let mut results = Vec::with_capacity(items.len());
        let mut pending = items.into_iter().enumerate().peekable();

        while pending.peek().is_some() {
            let mut tasks = JoinSet::new();
            for (index, request) in pending.by_ref().take(chunk_size) {
                let executor = Arc::clone(&self.executor);
                let tracker = tracker.clone();
                tasks.spawn(async move {
                    let outcome = executor.execute(&request).await;
                    let settled_at = Timestamp::now();
                    tracker.settle(outcome.is_ok());
                    (index, outcome, settled_at)
                });
            }

            let mut settled = Vec::with_capacity(tasks.len());
            let mut join_failure = None;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(item) => settled.push(item),
                    Err(err) => {
                        join_failure.get_or_insert(ToolkitError::Internal {
                            message: format!("batch task did not complete: {err}"),
                        });
                    }
                }
            }
            if let Some(err) = join_failure {
                return Err(err);
            }
            settled.sort_unstable_by_key(|(index, _, _)| *index);

            for (index, outcome, settled_at) in settled {
                match outcome {
                    Ok(response) => results.push(item_result(index, Ok(response.data), settled_at)),
                    Err(err) if continue_on_error => {
                        warn!(index, error = %err, "batch item failed; continuing");
                        results.push(item_result(index, Err(err), settled_at));
                    }
                    Err(err) => {
                        error!(index, error = %err, "batch item failed; aborting batch");
                        return Err(err);
                    }
                }
            }
        }
        Ok(results)
    }

    fn record(&self, kind: BatchKind, success: bool, duration: Duration) {
        if let Some(session) = self.executor.session() {
            session.record_operation(kind.operation_name(), success, duration);
        }
    }
}

fn item_result(
    index: usize,
    outcome: Result<Option<Value>, ToolkitError>,
    timestamp: Timestamp,
) -> BatchItemResult {
    BatchItemResult {
        index,
        outcome: outcome.map(|data| data.unwrap_or(Value::Null)),
        timestamp,
    }
}
