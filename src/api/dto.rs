//! Request/response bodies for the HTTP surface.
//!
//! Validation here is hand-written against the same constraints the wire
//! contract documents: non-empty prompt, priority in `[1, 10]`, batch
//! length in `[1, 10]`, well-formed webhook URL. Each `validate()` returns
//! [`BrokerError::Validation`] with a message the client can act on.

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;
use crate::executor::ExecuteRequest;
use crate::stats::{AggregateStatistics, DailyStatistics};
use crate::task::{NewTask, MAX_PRIORITY, MIN_PRIORITY};

/// Generic success envelope: `{success: true, ...fields}`.
///
/// Flattened so callers can embed any `Serialize` payload under the
/// envelope without a nested `data` key, matching the wire contract's
/// `{success: bool, ...}` shape.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap `data` in a `{success: true, ...}` envelope.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

fn validate_prompt(prompt: &str) -> Result<(), BrokerError> {
    if prompt.trim().is_empty() {
        return Err(BrokerError::Validation("prompt must not be empty".into()));
    }
    Ok(())
}

fn validate_priority(priority: Option<u8>) -> Result<(), BrokerError> {
    match priority {
        Some(p) if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&p) => Err(BrokerError::Validation(
            format!("priority must be in [{MIN_PRIORITY}, {MAX_PRIORITY}]"),
        )),
        _ => Ok(()),
    }
}

fn validate_webhook_url(url: Option<&str>) -> Result<(), BrokerError> {
    match url {
        Some(raw) if url::Url::parse(raw).is_err() => Err(BrokerError::Validation(format!(
            "webhook_url is not a well-formed URI: {raw}"
        ))),
        _ => Ok(()),
    }
}

/// Body of `POST /api/claude`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequestBody {
    /// Prompt payload. Must be non-empty.
    pub prompt: String,
    /// Working directory for the executor invocation.
    pub project_path: Option<String>,
    /// Executor model override.
    pub model: Option<String>,
    /// Existing session to attach this execution to.
    pub session_id: Option<String>,
    /// System prompt override.
    pub system_prompt: Option<String>,
    /// Maximum budget in USD.
    pub max_budget_usd: Option<f64>,
    /// Tool allowlist passed through to the executor.
    pub allowed_tools: Option<Vec<String>>,
    /// Tool denylist passed through to the executor.
    pub disallowed_tools: Option<Vec<String>>,
    /// Named agent profile.
    pub agent: Option<String>,
    /// Path to an MCP server config file.
    pub mcp_config: Option<String>,
    /// Request streaming output. Currently always rejected.
    #[serde(default)]
    pub stream: bool,
    /// Run asynchronously as a queued task instead of executing inline.
    #[serde(default)]
    pub r#async: bool,
    /// Scheduling priority for the async path.
    pub priority: Option<u8>,
    /// Per-delivery webhook URL override, stashed into the task's metadata.
    pub webhook_url: Option<String>,
    /// Free-form metadata to attach to the created task.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ExecuteRequestBody {
    /// Validate this body against the wire contract's constraints.
    pub fn validate(&self) -> Result<(), BrokerError> {
        validate_prompt(&self.prompt)?;
        validate_priority(self.priority)?;
        validate_webhook_url(self.webhook_url.as_deref())?;
        if self.stream {
            return Err(BrokerError::Validation(
                "streaming execution is not implemented".into(),
            ));
        }
        Ok(())
    }

    /// Build an [`ExecuteRequest`] for the synchronous executor path,
    /// falling back to `default_project_path`/`default_model` when the
    /// client omitted them.
    pub fn into_execute_request(
        self,
        default_project_path: &str,
        default_model: &str,
    ) -> ExecuteRequest {
        ExecuteRequest {
            prompt: self.prompt,
            project_path: self.project_path.unwrap_or_else(|| default_project_path.to_owned()),
            model: self.model.or_else(|| Some(default_model.to_owned())),
            session_id: self.session_id,
            system_prompt: self.system_prompt,
            max_budget_usd: self.max_budget_usd,
            allowed_tools: self.allowed_tools,
            disallowed_tools: self.disallowed_tools,
            agent: self.agent,
            mcp_config: self.mcp_config,
            stream: self.stream,
        }
    }
}

/// Body of `POST /api/claude/batch`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequestBody {
    /// Up to 10 prompts, executed concurrently.
    pub prompts: Vec<ExecuteRequestBody>,
}

impl BatchRequestBody {
    /// Validate batch length and every contained prompt.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.prompts.is_empty() || self.prompts.len() > 10 {
            return Err(BrokerError::Validation(
                "batch.prompts length must be in [1, 10]".into(),
            ));
        }
        for prompt in &self.prompts {
            prompt.validate()?;
        }
        Ok(())
    }
}

/// One item's outcome within a batch response.
#[derive(Debug, Serialize)]
pub struct BatchItemResult {
    /// Whether this item's execution succeeded.
    pub success: bool,
    /// Reply body on success.
    pub result: Option<serde_json::Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Cost incurred, if known.
    pub cost_usd: f64,
}

/// Response body of `POST /api/claude/batch`.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Per-item outcomes, in request order.
    pub results: Vec<BatchItemResult>,
    /// Summary counters.
    pub summary: BatchSummary,
}

/// Aggregate counters across a batch response's items.
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    /// Total items in the batch.
    pub total: usize,
    /// Items that succeeded.
    pub successful: usize,
    /// Items that failed.
    pub failed: usize,
    /// Sum of cost across all items.
    pub total_cost_usd: f64,
}

/// Body of `POST /api/tasks/async` — same shape as the async path of
/// `POST /api/claude`, without the `async`/`stream` fields.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskBody {
    /// Prompt payload. Must be non-empty.
    pub prompt: String,
    /// Scheduling priority in `[1, 10]`.
    pub priority: Option<u8>,
    /// Working directory for the executor invocation.
    pub project_path: Option<String>,
    /// Executor model override.
    pub model: Option<String>,
    /// Existing session to attach this task to.
    pub session_id: Option<String>,
    /// Per-delivery webhook URL override.
    pub webhook_url: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NewTaskBody {
    /// Validate this body against the wire contract's constraints.
    pub fn validate(&self) -> Result<(), BrokerError> {
        validate_prompt(&self.prompt)?;
        validate_priority(self.priority)?;
        validate_webhook_url(self.webhook_url.as_deref())?;
        Ok(())
    }

    /// Merge `webhook_url` into `metadata` under the key the scheduler
    /// reads for per-delivery overrides.
    pub fn metadata_with_webhook(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        if let Some(url) = &self.webhook_url {
            metadata.insert("webhook_url".to_owned(), serde_json::Value::String(url.clone()));
        }
        if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        }
    }

    /// Build a [`NewTask`] for the queued path, falling back to
    /// `default_project_path`/`default_model` when the client omitted them —
    /// mirrors [`ExecuteRequestBody::into_execute_request`].
    pub fn into_new_task(self, default_project_path: &str, default_model: &str) -> NewTask {
        let metadata = self.metadata_with_webhook();
        NewTask {
            priority: self.priority,
            prompt: self.prompt,
            project_path: Some(
                self.project_path
                    .unwrap_or_else(|| default_project_path.to_owned()),
            ),
            model: Some(self.model.unwrap_or_else(|| default_model.to_owned())),
            session_id: self.session_id,
            metadata,
        }
    }
}

/// Body of `PATCH /api/tasks/:id/priority`.
#[derive(Debug, Clone, Deserialize)]
pub struct PriorityPatchBody {
    /// New priority in `[1, 10]`.
    pub priority: u8,
}

impl PriorityPatchBody {
    /// Validate the new priority.
    pub fn validate(&self) -> Result<(), BrokerError> {
        validate_priority(Some(self.priority))
    }
}

/// Query parameters of `GET /api/tasks`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskListQuery {
    /// Restrict to this status string (`pending`, `processing`, ...).
    pub status: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Query parameters of `GET /api/sessions`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionListQuery {
    /// Restrict to this status string (`active`, `archived`).
    pub status: Option<String>,
    /// Restrict to sessions with this exact project path.
    pub project_path: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Query parameters of `GET /api/sessions/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSearchQuery {
    /// Case-insensitive substring to match against id and metadata.
    pub q: String,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Body of `POST /api/sessions/:id/continue`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinueSessionBody {
    /// Prompt continuing the session's conversation. Must be non-empty.
    pub prompt: String,
    /// System prompt override.
    pub system_prompt: Option<String>,
    /// Maximum budget in USD for this continuation.
    pub max_budget_usd: Option<f64>,
    /// Request streaming output. Currently always rejected.
    #[serde(default)]
    pub stream: bool,
}

impl ContinueSessionBody {
    /// Validate this body.
    pub fn validate(&self) -> Result<(), BrokerError> {
        validate_prompt(&self.prompt)?;
        if self.stream {
            return Err(BrokerError::Validation(
                "streaming execution is not implemented".into(),
            ));
        }
        Ok(())
    }
}

/// Response body of `GET /api/tasks/queue/status`.
#[derive(Debug, Serialize)]
pub struct QueueStatus {
    /// Whether the scheduler's dispatcher loop is running.
    pub running: bool,
    /// Tasks currently admitted and executing.
    pub active_tasks: usize,
    /// Configured concurrency limit.
    pub concurrency: usize,
    /// Persisted task counters.
    #[serde(flatten)]
    pub stats: crate::task::TaskStats,
}

/// Response body of `GET /api/tasks?status=&limit=`.
///
/// Wrapped in a named field (rather than a bare array) so it can sit
/// inside the flattened [`ApiResponse`] envelope, which requires a
/// struct or map payload.
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    /// Matching tasks.
    pub tasks: Vec<crate::task::Task>,
}

/// Response body of `GET /api/sessions` and `GET /api/sessions/search`.
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    /// Matching sessions.
    pub sessions: Vec<crate::session::Session>,
}

/// Response body of `GET /healthz`.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` when the handler runs at all.
    pub status: &'static str,
    /// Seconds since the process started.
    pub uptime_s: u64,
}

/// Response body of `GET /api/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Daily rollups, most recent first.
    pub daily: Vec<DailyStatistics>,
    /// Process-wide totals derived from `daily`.
    pub aggregate: AggregateStatistics,
}
