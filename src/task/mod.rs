//! Task records: the central entity of the orchestration subsystem.
//!
//! A [`Task`] moves through a small state machine —
//! `pending -> processing -> {completed, failed}`, with `cancelled`
//! reachable from `pending` or `processing` — enforced by the callers of
//! [`crate::task::store::TaskStore`], not the store itself (see module docs
//! there).

pub mod scheduler;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default priority assigned to a task when the caller does not specify one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Lowest legal priority value (inclusive).
pub const MIN_PRIORITY: u8 = 1;

/// Highest legal priority value (inclusive); 10 is highest.
pub const MAX_PRIORITY: u8 = 10;

/// Lifecycle status of a [`Task`].
///
/// `completed`, `failed`, and `cancelled` are absorbing: no transition
/// leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, not yet picked up by a scheduler worker.
    Pending,
    /// Currently running under the executor.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before or during execution.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions are legal).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A persisted unit of work submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque, time-sortable unique identifier.
    pub id: String,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task record was last mutated. Non-decreasing.
    pub updated_at: DateTime<Utc>,
    /// When the task first entered `processing`, if ever.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status, if ever.
    pub completed_at: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Scheduling priority, 1 (lowest) to 10 (highest). Default 5.
    pub priority: u8,
    /// Client-supplied prompt payload for the executor tool.
    pub prompt: String,
    /// Working directory for the executor tool invocation.
    pub project_path: String,
    /// Executor model identifier.
    pub model: String,
    /// Executor reply body on success.
    pub result: Option<serde_json::Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Measured wall-clock duration from `started_at` to terminal
    /// transition, in milliseconds.
    pub duration_ms: Option<u64>,
    /// Monetary cost of the executor run.
    pub cost_usd: f64,
    /// Associated session, if any.
    pub session_id: Option<String>,
    /// Free-form metadata supplied at creation (webhook URL override,
    /// executor options, etc.).
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Fields accepted when creating a new [`Task`]; everything else is filled
/// in with defaults by [`store::TaskStore::create`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    /// Scheduling priority; defaults to [`DEFAULT_PRIORITY`] when absent.
    pub priority: Option<u8>,
    /// Non-empty prompt payload.
    pub prompt: String,
    /// Working directory for the executor; defaults to the configured
    /// fallback when absent.
    pub project_path: Option<String>,
    /// Executor model; defaults to the configured fallback when absent.
    pub model: Option<String>,
    /// Associated session, if the client pre-created one.
    pub session_id: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Explicit set of fields a caller may patch on a [`Task`].
///
/// Deliberately narrower than "merge an arbitrary JSON object" — only the
/// fields a legal state transition can touch are representable here.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// New status, if changing.
    pub status: Option<TaskStatus>,
    /// New priority, if changing.
    pub priority: Option<u8>,
    /// Set `started_at` (only ever moves from `None` to `Some`).
    pub started_at: Option<DateTime<Utc>>,
    /// Set `completed_at` (only ever moves from `None` to `Some`).
    pub completed_at: Option<DateTime<Utc>>,
    /// Executor reply body on success.
    pub result: Option<serde_json::Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Measured duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// New cost, if changing.
    pub cost_usd: Option<f64>,
}

/// Outcome of an operation that can fail two distinct ways depending on a
/// task's existence and status: [`store::TaskStore::cancel`] and
/// [`store::TaskStore::update_priority`] both refuse terminal tasks, which
/// callers must report as a different HTTP status than an unknown id.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// The mutation applied; carries the updated record.
    Updated(Task),
    /// No task with that id exists.
    NotFound,
    /// The task exists but is already in a terminal status.
    Terminal,
}

/// Aggregate counters returned by [`store::TaskStore::get_stats`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TaskStats {
    /// Total number of task records.
    pub total: usize,
    /// Tasks currently `pending`.
    pub pending: usize,
    /// Tasks currently `processing`.
    pub processing: usize,
    /// Tasks `completed`.
    pub completed: usize,
    /// Tasks `failed`.
    pub failed: usize,
    /// Tasks `cancelled`.
    pub cancelled: usize,
    /// Sum of `cost_usd` across all tasks.
    pub total_cost_usd: f64,
}
