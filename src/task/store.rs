//! Persistent set of [`Task`] records with indexed access by id and by
//! `(status, priority, created_at)` ordering.
//!
//! All mutations go through [`PersistentStore::with_lock`]. Read-only
//! queries read the current in-memory document without taking the write
//! path, tolerating a possibly-stale view under concurrent writers but
//! never a torn one.
//!
//! This store does not enforce the task lifecycle FSM — callers (the
//! scheduler, the API handlers) are responsible for only ever constructing
//! patches that drive legal transitions. What it does enforce: terminal
//! tasks refuse [`TaskStore::cancel`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::store::{generate_id, PersistentStore, StoreError};
use crate::task::{NewTask, Task, TaskPatch, TaskStats, TaskStatus, UpdateOutcome, DEFAULT_PRIORITY};

/// Errors produced by [`TaskStore`] operations.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    /// Underlying persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct TaskDocument {
    tasks: Vec<Task>,
}

/// Optional filter for [`TaskStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskListFilter {
    /// Restrict to this status, if set.
    pub status: Option<TaskStatus>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Persistent task store backed by a single `tasks.json` document.
pub struct TaskStore {
    store: PersistentStore<TaskDocument>,
}

impl TaskStore {
    /// Open (or initialize) the task store at `path`.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, TaskStoreError> {
        Ok(Self {
            store: PersistentStore::open(path).await?,
        })
    }

    /// Create a new task, filling in defaults: id, timestamps, `pending`
    /// status, priority 5, zero cost.
    pub async fn create(&self, new: NewTask) -> Result<Task, TaskStoreError> {
        let now = Utc::now();
        let task = Task {
            id: generate_id(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            status: TaskStatus::Pending,
            priority: new.priority.unwrap_or(DEFAULT_PRIORITY),
            prompt: new.prompt,
            project_path: new.project_path.unwrap_or_default(),
            model: new.model.unwrap_or_default(),
            result: None,
            error: None,
            duration_ms: None,
            cost_usd: 0.0,
            session_id: new.session_id,
            metadata: new.metadata.unwrap_or_default(),
        };

        let created = task.clone();
        self.store
            .with_lock(|doc| doc.tasks.push(task))
            .await?;
        debug!(task_id = %created.id, priority = created.priority, "task created");
        Ok(created)
    }

    /// Fetch a task by id.
    pub async fn get(&self, id: &str) -> Option<Task> {
        let doc = self.store.read().await;
        doc.tasks.into_iter().find(|t| t.id == id)
    }

    /// Shallow-merge `patch` into the task with `id`, bumping `updated_at`.
    /// Returns `None` if no task with that id exists.
    pub async fn update(
        &self,
        id: &str,
        patch: TaskPatch,
    ) -> Result<Option<Task>, TaskStoreError> {
        let result = self
            .store
            .with_lock(|doc| {
                let task = doc.tasks.iter_mut().find(|t| t.id == id)?;
                apply_patch(task, patch);
                task.updated_at = Utc::now();
                Some(task.clone())
            })
            .await?;
        Ok(result)
    }

    /// Delete a task by id. Returns `true` if a record was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, TaskStoreError> {
        let removed = self
            .store
            .with_lock(|doc| {
                let before = doc.tasks.len();
                doc.tasks.retain(|t| t.id != id);
                doc.tasks.len() != before
            })
            .await?;
        Ok(removed)
    }

    /// List tasks matching `filter`, ordered by priority descending then
    /// `created_at` ascending.
    pub async fn list(&self, filter: TaskListFilter) -> Vec<Task> {
        let doc = self.store.read().await;
        let mut tasks: Vec<Task> = doc
            .tasks
            .into_iter()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .collect();
        sort_by_priority_then_age(&mut tasks);
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        tasks
    }

    /// Return the highest-priority, oldest `pending` task, or `None` if the
    /// queue is empty. Ties break by id.
    pub async fn get_next_pending(&self) -> Option<Task> {
        let doc = self.store.read().await;
        let mut pending: Vec<Task> = doc
            .tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect();
        sort_by_priority_then_age(&mut pending);
        pending.into_iter().next()
    }

    /// Transition a task to `processing`, setting `started_at` if unset.
    pub async fn mark_processing(&self, id: &str) -> Result<Option<Task>, TaskStoreError> {
        let now = Utc::now();
        self.update(
            id,
            TaskPatch {
                status: Some(TaskStatus::Processing),
                started_at: Some(now),
                ..Default::default()
            },
        )
        .await
    }

    /// Transition a task to `completed`, recording the result, cost, and
    /// duration (`now - started_at`, `None` if `started_at` was never set).
    pub async fn mark_completed(
        &self,
        id: &str,
        result: serde_json::Value,
        cost_usd: f64,
    ) -> Result<Option<Task>, TaskStoreError> {
        let now = Utc::now();
        let duration_ms = self.duration_since_started(id, now).await;
        self.update(
            id,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                completed_at: Some(now),
                result: Some(result),
                cost_usd: Some(cost_usd),
                duration_ms,
                ..Default::default()
            },
        )
        .await
    }

    /// Transition a task to `failed`, recording the error and duration.
    pub async fn mark_failed(
        &self,
        id: &str,
        error: impl Into<String>,
    ) -> Result<Option<Task>, TaskStoreError> {
        let now = Utc::now();
        let duration_ms = self.duration_since_started(id, now).await;
        self.update(
            id,
            TaskPatch {
                status: Some(TaskStatus::Failed),
                completed_at: Some(now),
                error: Some(error.into()),
                duration_ms,
                ..Default::default()
            },
        )
        .await
    }

    /// Cancel a task. Distinguishes an unknown id from one that exists but
    /// is already terminal, so callers can map each to the right HTTP
    /// status.
    pub async fn cancel(&self, id: &str) -> Result<UpdateOutcome, TaskStoreError> {
        let result = self
            .store
            .with_lock(|doc| {
                let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
                    return UpdateOutcome::NotFound;
                };
                if task.status.is_terminal() {
                    return UpdateOutcome::Terminal;
                }
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
                task.updated_at = Utc::now();
                UpdateOutcome::Updated(task.clone())
            })
            .await?;
        Ok(result)
    }

    /// Remove terminal tasks older than `retention_days`, measured from
    /// `completed_at` (falling back to `created_at` if unset — should not
    /// happen for a terminal task, but guards against data built by an
    /// earlier schema).
    pub async fn cleanup(&self, retention_days: i64) -> Result<usize, TaskStoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let deleted = self
            .store
            .with_lock(|doc| {
                let before = doc.tasks.len();
                doc.tasks.retain(|t| {
                    if !t.status.is_terminal() {
                        return true;
                    }
                    let reference = t.completed_at.unwrap_or(t.created_at);
                    reference >= cutoff
                });
                before - doc.tasks.len()
            })
            .await?;
        Ok(deleted)
    }

    /// Reset every `processing` task back to `pending`, leaving
    /// `started_at` untouched for observability. Called once at scheduler
    /// startup so tasks interrupted by a crash re-enter the queue instead
    /// of being stuck mid-flight forever. Returns the number of tasks
    /// reset.
    pub async fn recover_interrupted(&self) -> Result<usize, TaskStoreError> {
        let reset = self
            .store
            .with_lock(|doc| {
                let mut count = 0;
                for task in doc.tasks.iter_mut() {
                    if task.status == TaskStatus::Processing {
                        task.status = TaskStatus::Pending;
                        task.updated_at = Utc::now();
                        count += 1;
                    }
                }
                count
            })
            .await?;
        Ok(reset)
    }

    /// Update a task's priority. Allowed only on `pending`/`processing`
    /// tasks; distinguishes an unknown id from one that exists but is
    /// already terminal.
    pub async fn update_priority(
        &self,
        id: &str,
        priority: u8,
    ) -> Result<UpdateOutcome, TaskStoreError> {
        let result = self
            .store
            .with_lock(|doc| {
                let Some(task) = doc.tasks.iter_mut().find(|t| t.id == id) else {
                    return UpdateOutcome::NotFound;
                };
                if task.status.is_terminal() {
                    return UpdateOutcome::Terminal;
                }
                task.priority = priority;
                task.updated_at = Utc::now();
                UpdateOutcome::Updated(task.clone())
            })
            .await?;
        Ok(result)
    }

    /// Aggregate counters across all task records.
    pub async fn get_stats(&self) -> TaskStats {
        let doc = self.store.read().await;
        let mut stats = TaskStats::default();
        for task in &doc.tasks {
            stats.total += 1;
            stats.total_cost_usd += task.cost_usd;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    async fn duration_since_started(&self, id: &str, now: DateTime<Utc>) -> Option<u64> {
        let task = self.get(id).await?;
        let started = task.started_at?;
        u64::try_from(now.signed_duration_since(started).num_milliseconds()).ok()
    }
}

fn apply_patch(task: &mut Task, patch: TaskPatch) {
    if let Some(status) = patch.status {
        task.status = status;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(started_at) = patch.started_at {
        task.started_at.get_or_insert(started_at);
    }
    if let Some(completed_at) = patch.completed_at {
        task.completed_at = Some(completed_at);
    }
    if let Some(result) = patch.result {
        task.result = Some(result);
    }
    if let Some(error) = patch.error {
        task.error = Some(error);
    }
    if let Some(duration_ms) = patch.duration_ms {
        task.duration_ms = Some(duration_ms);
    }
    if let Some(cost_usd) = patch.cost_usd {
        task.cost_usd = cost_usd;
    }
}

fn sort_by_priority_then_age(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
