//! Recommendation worker pool
//!
//! Tasks wait in one bounded queue. A fixed set of workers shares the
//! receiving end behind a mutex, so each task is taken by exactly one
//! worker. A failed attempt is put back on the queue with its retry count
//! bumped; once the count reaches the limit the task is dropped.
//!
//! A worker never waits on its own queue: when a retry finds the queue
//! full, a short-lived task performs the send instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::broadcast::EventPublisher;
use crate::registry::Audience;
use crate::render::{Event, Render};
use crate::stats::EngineStats;
use crate::store::EstimateStore;

use super::error::{OracleError, RecommendError};
use super::oracle::{Oracle, RecommendedEstimate};
use super::task::{RecommendationTask, TaskOutcome};

/// Capacity of the outcome feed
const OUTCOME_CAPACITY: usize = 256;

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of workers
    pub workers: usize,
    /// Queue capacity
    pub capacity: usize,
    /// Hard limit for one oracle call
    pub oracle_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            capacity: 100,
            oracle_timeout: Duration::from_secs(4),
            max_retries: 3,
        }
    }
}

/// Sending side of the task queue
#[derive(Debug, Clone)]
pub struct RecommendQueue {
    tx: mpsc::Sender<RecommendationTask>,
}

impl RecommendQueue {
    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::Sender<RecommendationTask>) -> Self {
        Self { tx }
    }

    /// Enqueue a task, waiting for space
    pub async fn submit(&self, task: RecommendationTask) -> Result<(), RecommendError> {
        self.tx.send(task).await.map_err(|_| RecommendError::Closed)
    }

    /// Enqueue a task without waiting
    pub fn try_submit(&self, task: RecommendationTask) -> Result<(), RecommendError> {
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RecommendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RecommendError::Closed,
        })
    }

    fn requeue(&self, task: RecommendationTask) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(task).await.is_err() {
                        tracing::debug!("Pipeline stopped before retry was queued");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                tracing::warn!(ticket_id = task.ticket_id, "Pipeline stopped, retry discarded");
            }
        }
    }
}

struct Worker<S, O, R> {
    store: Arc<S>,
    oracle: Arc<O>,
    publisher: Arc<EventPublisher<R>>,
    queue: RecommendQueue,
    config: PipelineConfig,
    stats: Arc<EngineStats>,
    outcomes: broadcast::Sender<TaskOutcome>,
}

impl<S, O, R> Worker<S, O, R>
where
    S: EstimateStore,
    O: Oracle,
    R: Render,
{
    async fn process(&self, task: RecommendationTask) -> TaskOutcome {
        tracing::debug!(
            ticket_id = task.ticket_id,
            room_id = task.room_id,
            attempt = task.retry_count + 1,
            "Processing recommendation"
        );

        match self.store.room_allows_oracle(task.room_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(room_id = task.room_id, "Recommendations disabled for room");
                return TaskOutcome::Skipped { task };
            }
            Err(e) => {
                tracing::error!(room_id = task.room_id, error = %e, "Failed to read room settings");
                return TaskOutcome::Skipped { task };
            }
        }

        let timeout = self.config.oracle_timeout;
        let call = self
            .oracle
            .estimate(&task.external_key, &task.description, timeout);
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout),
        };
        let result = result
            .and_then(|estimate| estimate.checked_hours().map(|hours| (estimate, hours)));

        match result {
            Ok((estimate, hours)) => {
                self.deliver(&task, estimate, hours).await;
                TaskOutcome::Succeeded { task, estimate }
            }
            Err(e) if task.retry_count < self.config.max_retries => {
                tracing::warn!(
                    ticket_id = task.ticket_id,
                    retry_count = task.retry_count,
                    error = %e,
                    "Oracle failed, retrying"
                );
                self.queue.requeue(task.next_attempt());
                TaskOutcome::Requeued { task }
            }
            Err(e) => {
                tracing::warn!(
                    ticket_id = task.ticket_id,
                    retry_count = task.retry_count,
                    error = %e,
                    "Oracle failed, recommendation dropped"
                );
                TaskOutcome::Dropped {
                    task,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn deliver(&self, task: &RecommendationTask, estimate: RecommendedEstimate, hours: i64) {
        if let Err(e) = self
            .store
            .create_system_estimate(task.ticket_id, hours)
            .await
        {
            tracing::error!(ticket_id = task.ticket_id, error = %e, "Failed to save recommendation");
        }

        let event = Event::RecommendationAvailable {
            room_id: task.room_id,
            ticket_id: task.ticket_id,
            external_key: Some(task.external_key.clone()),
            recommendation: format!("Recommended estimate: {}", estimate),
        };
        self.publisher
            .publish(task.room_id, Audience::Everyone, &event)
            .await;
    }

    fn report(&self, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Succeeded { .. } => self.stats.recommendation_succeeded(),
            TaskOutcome::Requeued { .. } => self.stats.recommendation_requeued(),
            TaskOutcome::Dropped { .. } => self.stats.recommendation_dropped(),
            TaskOutcome::Skipped { .. } => self.stats.recommendation_skipped(),
        }
        // No subscribers is fine
        let _ = self.outcomes.send(outcome);
    }
}

async fn run_worker<S, O, R>(
    index: usize,
    worker: Arc<Worker<S, O, R>>,
    rx: Arc<Mutex<mpsc::Receiver<RecommendationTask>>>,
) where
    S: EstimateStore,
    O: Oracle,
    R: Render,
{
    loop {
        let next = rx.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        let outcome = worker.process(task).await;
        worker.report(outcome);
    }

    tracing::debug!(worker = index, "Recommendation worker stopped");
}

/// Running recommendation worker pool
pub struct RecommendationPipeline {
    queue: RecommendQueue,
    outcomes: broadcast::Sender<TaskOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl RecommendationPipeline {
    /// Start the workers
    pub fn spawn<S, O, R>(
        config: PipelineConfig,
        store: Arc<S>,
        oracle: Arc<O>,
        publisher: Arc<EventPublisher<R>>,
    ) -> Self
    where
        S: EstimateStore,
        O: Oracle,
        R: Render,
    {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        let queue = RecommendQueue { tx };
        let rx = Arc::new(Mutex::new(rx));
        let count = config.workers.max(1);

        let worker = Arc::new(Worker {
            store,
            oracle,
            stats: Arc::clone(publisher.stats()),
            publisher,
            queue: queue.clone(),
            config,
            outcomes: outcomes.clone(),
        });

        let workers = (0..count)
            .map(|index| tokio::spawn(run_worker(index, Arc::clone(&worker), Arc::clone(&rx))))
            .collect();

        tracing::debug!(workers = count, "Recommendation workers started");

        Self {
            queue,
            outcomes,
            workers,
        }
    }

    /// Handle for submitting tasks
    pub fn queue(&self) -> RecommendQueue {
        self.queue.clone()
    }

    /// Feed of task outcomes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TaskOutcome> {
        self.outcomes.subscribe()
    }

    /// Stop all workers; queued tasks are dropped
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
