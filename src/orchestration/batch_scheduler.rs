//! # Batch Scheduler
//!
//! Runs a run's tasks against a [`CompletionClient`] with at most `concurrency`
//! completions in flight, using a semaphore-gated launcher over tokio tasks.
//!
//! The scheduler never touches cell state. It reports lifecycle through a channel
//! of [`ComputeEvent`]s consumed by a single reducer:
//!
//! - `Started` is sent once per dispatched task, immediately before its request
//! - `Finished` is sent exactly once per task, whatever the outcome
//!
//! ## Cancellation
//!
//! The run's [`CancellationToken`] is shared with every request. Tasks still
//! waiting for a slot when it fires resolve locally to "Batch cancelled" with no
//! `Started` event and no client call; dispatched requests observe the same token.
//!
//! ## Failure isolation
//!
//! A panicking client call is caught and mapped to a failed result, and the
//! optional per-task timeout maps expiry to a failed result, so the
//! one-result-per-task guarantee holds for every task.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::completion_client::CompletionClient;
use crate::constants::{defaults, messages};
use crate::models::{ComputeResult, ComputeTask};

/// Lifecycle notification from the scheduler to the run's reducer
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeEvent {
    /// The task acquired a slot and its request is about to be sent
    Started(ComputeTask),
    /// The task's single outcome
    Finished(ComputeResult),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum concurrently in-flight completions (at least 1)
    pub concurrency: usize,
    /// Per-request bound; `None` waits for the client or cancellation
    pub task_timeout: Option<Duration>,
    /// Identifier for logging
    pub scheduler_id: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            task_timeout: None,
            scheduler_id: "batch_scheduler".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    pub fn with_task_timeout(mut self, task_timeout: Option<Duration>) -> Self {
        self.task_timeout = task_timeout;
        self
    }
}

pub struct BatchScheduler {
    client: Arc<dyn CompletionClient>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("client", &self.client.name())
            .field("config", &self.config)
            .finish()
    }
}

impl BatchScheduler {
    pub fn new(client: Arc<dyn CompletionClient>, config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            concurrency: config.concurrency.max(1),
            ..config
        };
        Self { client, config }
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Resolve every task; results come back in completion order
    ///
    /// Returns once each task has produced exactly one `Finished` event. A closed
    /// event channel does not stop the run.
    pub async fn run(
        &self,
        tasks: Vec<ComputeTask>,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<ComputeEvent>,
    ) -> Vec<ComputeResult> {
        let total = tasks.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut join_set = JoinSet::new();

        debug!(
            scheduler_id = %self.config.scheduler_id,
            tasks = total,
            concurrency = self.config.concurrency,
            "Scheduling batch"
        );

        for task in tasks {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let events = events.clone();
            let timeout = self.config.task_timeout;

            join_set.spawn(async move {
                let result =
                    Self::execute_task(client, semaphore, &cancel, &events, timeout, task).await;
                if events.send(ComputeEvent::Finished(result.clone())).is_err() {
                    debug!(row_id = %result.row_id, "Event receiver closed, result not reported");
                }
                result
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(
                    scheduler_id = %self.config.scheduler_id,
                    error = %e,
                    "Scheduled task aborted without a result"
                ),
            }
        }

        debug!(
            scheduler_id = %self.config.scheduler_id,
            resolved = results.len(),
            cancelled = cancel.is_cancelled(),
            "Batch resolved"
        );

        results
    }

    async fn execute_task(
        client: Arc<dyn CompletionClient>,
        semaphore: Arc<Semaphore>,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<ComputeEvent>,
        timeout: Option<Duration>,
        task: ComputeTask,
    ) -> ComputeResult {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ComputeResult::batch_cancelled(&task),
            acquired = semaphore.acquire_owned() => match acquired {
                Ok(permit) => permit,
                Err(_) => {
                    error!(row_id = %task.row_id, "Scheduler semaphore closed");
                    return ComputeResult::failure(&task, messages::SCHEDULER_UNAVAILABLE);
                }
            },
        };

        // Both branches may have been ready; stop wins
        if cancel.is_cancelled() {
            return ComputeResult::batch_cancelled(&task);
        }

        let _ = events.send(ComputeEvent::Started(task.clone()));

        let call = AssertUnwindSafe(client.complete(&task, cancel)).catch_unwind();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        row_id = %task.row_id,
                        timeout_ms = limit.as_millis() as u64,
                        "Completion timed out"
                    );
                    Ok(ComputeResult::failure(
                        &task,
                        format!("Request timed out after {}ms", limit.as_millis()),
                    ))
                }
            },
            None => call.await,
        };

        // Slot is released before the result is reported
        drop(permit);

        outcome.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!(row_id = %task.row_id, panic = %message, "Completion client panicked");
            ComputeResult::failure(&task, format!("Completion client panicked: {message}"))
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
