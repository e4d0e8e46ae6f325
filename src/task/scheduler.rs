//! Priority queue, concurrency admission, timeout coordination, crash
//! recovery, and cancellation — the dispatcher that drives [`Task`] records
//! through the executor.
//!
//! One dispatcher loop (tick-driven, mirroring the ambient heartbeat-style
//! scheduling this crate's ancestor uses for periodic work) admits pending
//! tasks up to a concurrency limit; each admitted task then runs to
//! completion in its own spawned future. The in-memory `active` map is the
//! scheduler's private bookkeeping of "what's currently running" — the
//! in-memory slot is reserved before the task is persisted as `processing`,
//! so two ticks can never double-pick the same task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::executor::claude_cli::TIMEOUT_ERROR_MESSAGE;
use crate::executor::{ExecuteRequest, ExecuteResult, Executor};
use crate::session::store::SessionStore;
use crate::stats::{RequestRecord, StatsStore};
use crate::task::store::{TaskStore, TaskStoreError};
use crate::task::{Task, TaskStatus, UpdateOutcome};
use crate::webhook::{WebhookDispatcher, WebhookEvent};

/// Errors raised directly by scheduler control operations (not by the
/// tasks it dispatches, which record their own failures on the task).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying task store failure.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

/// Bookkeeping for one currently-dispatched task.
struct ActiveEntry {
    started_at: Instant,
}

/// Drives [`Task`] records from `pending` through the executor to a
/// terminal status, emitting webhook events and session cost accrual along
/// the way.
pub struct TaskScheduler {
    task_store: Arc<TaskStore>,
    session_store: Arc<SessionStore>,
    stats_store: Arc<StatsStore>,
    executor: Arc<dyn Executor>,
    webhook: Arc<WebhookDispatcher>,
    concurrency: usize,
    poll_interval: Duration,
    default_timeout: Duration,
    active: Arc<Mutex<HashMap<String, ActiveEntry>>>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Build a scheduler. `concurrency` bounds simultaneously `processing`
    /// tasks; `poll_interval` is the dispatcher tick period;
    /// `default_timeout` bounds each executor invocation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_store: Arc<TaskStore>,
        session_store: Arc<SessionStore>,
        stats_store: Arc<StatsStore>,
        executor: Arc<dyn Executor>,
        webhook: Arc<WebhookDispatcher>,
        concurrency: usize,
        poll_interval: Duration,
        default_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            task_store,
            session_store,
            stats_store,
            executor,
            webhook,
            concurrency: concurrency.max(1),
            poll_interval,
            default_timeout,
            active: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            dispatcher: Mutex::new(None),
        })
    }

    /// Recover tasks interrupted by a prior crash (`processing` -> back to
    /// `pending`), then start the dispatcher loop. Idempotent only in the
    /// sense that calling it twice spawns two loops — callers should call
    /// it once at process startup.
    pub async fn start(self: &Arc<Self>) -> Result<usize, SchedulerError> {
        let recovered = self.task_store.recover_interrupted().await?;
        if recovered > 0 {
            info!(recovered, "reset interrupted tasks to pending on startup");
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            scheduler.dispatch_loop().await;
        });
        *self.dispatcher.lock().await = Some(handle);
        Ok(recovered)
    }

    /// Signal the dispatcher loop to stop admitting new tasks, then wait up
    /// to `soft_deadline` for in-flight tasks to drain. Tasks still active
    /// past the deadline are abandoned (left running; the scheduler simply
    /// stops waiting on them).
    pub async fn stop(&self, soft_deadline: Duration) {
        self.shutdown.cancel();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }

        let deadline = Instant::now() + soft_deadline;
        loop {
            if self.active.lock().await.is_empty() {
                return;
            }
            if Instant::now() >= deadline {
                let active = self.active.lock().await;
                let longest_running_ms = active
                    .values()
                    .map(|entry| entry.started_at.elapsed().as_millis())
                    .max()
                    .unwrap_or(0);
                warn!(
                    remaining = active.len(),
                    longest_running_ms, "scheduler stop deadline reached, abandoning active tasks"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Best-effort cancellation: marks the task `cancelled` and releases its
    /// scheduler-side slot if active. Does not kill an in-flight executor
    /// subprocess — its result is simply discarded when it completes (see
    /// [`Self::finish_success`] and [`Self::finish_failure`]). Distinguishes
    /// an unknown id from one that exists but is already terminal.
    pub async fn cancel_task(&self, id: &str) -> Result<UpdateOutcome, SchedulerError> {
        let outcome = self.task_store.cancel(id).await?;
        let UpdateOutcome::Updated(task) = &outcome else {
            return Ok(outcome);
        };

        self.active.lock().await.remove(id);
        self.webhook.dispatch(
            WebhookEvent::TaskCancelled,
            task_payload(task),
            webhook_override(task),
        );
        Ok(outcome)
    }

    /// Update a task's priority. Takes effect on the dispatcher's next
    /// tick, since `get_next_pending` always re-reads the persisted
    /// priority fresh. Distinguishes an unknown id from one that exists but
    /// is already terminal.
    pub async fn update_priority(&self, id: &str, priority: u8) -> Result<UpdateOutcome, SchedulerError> {
        self.task_store.update_priority(id, priority).await.map_err(SchedulerError::from)
    }

    /// Number of tasks currently admitted and running.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    async fn dispatch_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("dispatcher loop observed shutdown signal, stopping admission");
                    return;
                }
                _ = ticker.tick() => {
                    admit_ready_tasks(&self).await;
                }
            }
        }
    }

    async fn run_task(self: Arc<Self>, task: Task) {
        let request = request_from_task(&task);
        let result = self.executor.execute(request, self.default_timeout).await;

        match result {
            Ok(ExecuteResult::Success {
                result,
                cost_usd,
                usage,
                ..
            }) => {
                self.finish_success(&task, result, cost_usd, usage.input_tokens, usage.output_tokens)
                    .await;
            }
            Ok(ExecuteResult::Failure { error, .. }) => {
                self.finish_failure(&task, error).await;
            }
            Err(e) => {
                self.finish_failure(&task, e.to_string()).await;
            }
        }

        self.active.lock().await.remove(&task.id);
    }

    async fn finish_success(
        &self,
        task: &Task,
        result: serde_json::Value,
        cost_usd: f64,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        if self.already_cancelled(&task.id).await {
            return;
        }

        let updated = match self.task_store.mark_completed(&task.id, result, cost_usd).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "failed to persist task completion");
                return;
            }
        };

        if let Some(session_id) = &task.session_id {
            let _ = self.session_store.add_cost(session_id, cost_usd).await;
            let _ = self.session_store.increment_messages(session_id).await;
        }

        self.stats_store
            .record_request(RequestRecord {
                success: true,
                model: non_empty(&task.model),
                input_tokens,
                output_tokens,
                cost_usd,
            })
            .await
            .ok();

        self.webhook.dispatch(
            WebhookEvent::TaskCompleted,
            task_payload(&updated),
            webhook_override(&updated),
        );
    }

    async fn finish_failure(&self, task: &Task, error: String) {
        if self.already_cancelled(&task.id).await {
            return;
        }

        let updated = match self.task_store.mark_failed(&task.id, error.clone()).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "failed to persist task failure");
                return;
            }
        };

        self.stats_store
            .record_request(RequestRecord {
                success: false,
                model: non_empty(&task.model),
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: 0.0,
            })
            .await
            .ok();

        let event = if error == TIMEOUT_ERROR_MESSAGE {
            WebhookEvent::TaskTimeout
        } else {
            WebhookEvent::TaskFailed
        };
        self.webhook
            .dispatch(event, task_payload(&updated), webhook_override(&updated));
    }

    /// A task already marked `cancelled` (by [`Self::cancel_task`] while the
    /// executor was still running) must not have its terminal status
    /// overwritten by a late-arriving success or failure.
    async fn already_cancelled(&self, id: &str) -> bool {
        matches!(
            self.task_store.get(id).await.map(|t| t.status),
            Some(TaskStatus::Cancelled)
        )
    }
}

/// Admit as many pending tasks as the concurrency limit allows, reserving
/// each one's in-memory slot before persisting its `processing` transition
/// so a second tick can never pick the same task twice.
async fn admit_ready_tasks(scheduler: &Arc<TaskScheduler>) {
    loop {
        {
            let active = scheduler.active.lock().await;
            if active.len() >= scheduler.concurrency {
                return;
            }
        }

        let Some(task) = scheduler.task_store.get_next_pending().await else {
            return;
        };

        {
            let mut active = scheduler.active.lock().await;
            if active.len() >= scheduler.concurrency || active.contains_key(&task.id) {
                return;
            }
            active.insert(
                task.id.clone(),
                ActiveEntry {
                    started_at: Instant::now(),
                },
            );
        }

        match scheduler.task_store.mark_processing(&task.id).await {
            Ok(Some(task)) => {
                let runner = Arc::clone(scheduler);
                tokio::spawn(async move {
                    runner.run_task(task).await;
                });
            }
            Ok(None) => {
                scheduler.active.lock().await.remove(&task.id);
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "failed to persist processing transition");
                scheduler.active.lock().await.remove(&task.id);
            }
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

fn webhook_override(task: &Task) -> Option<String> {
    task.metadata
        .get("webhook_url")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}

fn task_payload(task: &Task) -> serde_json::Value {
    serde_json::to_value(task).unwrap_or(serde_json::Value::Null)
}

fn request_from_task(task: &Task) -> ExecuteRequest {
    let metadata = &task.metadata;
    ExecuteRequest {
        prompt: task.prompt.clone(),
        project_path: task.project_path.clone(),
        model: non_empty(&task.model),
        session_id: task.session_id.clone(),
        system_prompt: metadata_str(metadata, "system_prompt"),
        max_budget_usd: metadata.get("max_budget_usd").and_then(serde_json::Value::as_f64),
        allowed_tools: metadata_str_list(metadata, "allowed_tools"),
        disallowed_tools: metadata_str_list(metadata, "disallowed_tools"),
        agent: metadata_str(metadata, "agent"),
        mcp_config: metadata_str(metadata, "mcp_config"),
        stream: false,
    }
}

fn metadata_str(metadata: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    metadata.get(key).and_then(serde_json::Value::as_str).map(str::to_owned)
}

fn metadata_str_list(
    metadata: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<Vec<String>> {
    metadata.get(key).and_then(serde_json::Value::as_array).map(|values| {
        values
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(str::to_owned)
            .collect()
    })
}
