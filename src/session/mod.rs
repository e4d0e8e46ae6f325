//! Session records: a logical grouping of executions sharing model and
//! project context, accumulating cost.

pub mod manager;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting new tasks/continuations.
    Active,
    /// Read-only; [`manager::SessionManager::continue_session`] refuses it.
    Archived,
}

/// A logical grouping of executor invocations sharing model and project
/// context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque, time-sortable unique identifier.
    pub id: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session record was last mutated.
    pub updated_at: DateTime<Utc>,
    /// Executor model identifier for this session.
    pub model: String,
    /// Working directory shared by all executions in this session.
    pub project_path: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Running total of cost accrued by executions in this session.
    /// Always non-negative.
    pub total_cost_usd: f64,
    /// Number of messages/turns accrued. Monotonically non-decreasing while
    /// `status` is `active`.
    pub messages_count: u64,
    /// Free-form metadata.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Fields accepted when creating a new [`Session`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSession {
    /// Executor model; defaults to the configured fallback when absent.
    pub model: Option<String>,
    /// Working directory; defaults to the configured fallback when absent.
    pub project_path: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Aggregate counters returned by [`store::SessionStore`] consumers.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    /// Total number of session records.
    pub total: usize,
    /// Sessions currently `active`.
    pub active: usize,
    /// Sessions `archived`.
    pub archived: usize,
    /// Sum of `total_cost_usd` across all sessions.
    pub total_cost_usd: f64,
}
