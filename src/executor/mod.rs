//! The executor tool contract: invoking an external command-line agent
//! process and parsing its one-shot JSON reply.

pub mod claude_cli;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options accepted by [`Executor::execute`], mirroring the executor tool's
/// `execute({...})` contract.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    /// Client-supplied prompt.
    pub prompt: String,
    /// Working directory for the executor invocation.
    pub project_path: String,
    /// Executor model identifier, if overridden.
    pub model: Option<String>,
    /// Existing session to resume, if any.
    pub session_id: Option<String>,
    /// System prompt override, if any.
    pub system_prompt: Option<String>,
    /// Maximum budget in USD the executor may spend on this call.
    pub max_budget_usd: Option<f64>,
    /// Explicit tool allowlist passed through to the executor.
    pub allowed_tools: Option<Vec<String>>,
    /// Explicit tool denylist passed through to the executor.
    pub disallowed_tools: Option<Vec<String>>,
    /// Named agent profile, if the executor supports one.
    pub agent: Option<String>,
    /// Path to an MCP server config file, if any.
    pub mcp_config: Option<String>,
    /// Whether the caller requested streaming output.
    ///
    /// Streaming is reserved; requesting it is rejected at the validation
    /// boundary (see [`crate::api::dto`]) before an `ExecuteRequest` is ever
    /// built, so this field exists only to round-trip the client's input
    /// for diagnostics.
    pub stream: bool,
}

/// Usage accounting reported by the executor tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
}

/// Outcome of an [`Executor::execute`] call.
#[derive(Debug, Clone)]
pub enum ExecuteResult {
    /// The executor produced a usable reply.
    Success {
        /// Executor reply body.
        result: serde_json::Value,
        /// Wall-clock duration of the invocation.
        duration_ms: u64,
        /// Cost reported by the executor.
        cost_usd: f64,
        /// Session id the executor reply is associated with, if any.
        session_id: Option<String>,
        /// Token usage, if reported.
        usage: Usage,
    },
    /// The executor failed — non-zero exit, unparseable output, or a
    /// runtime error invoking it.
    Failure {
        /// Human-readable error message.
        error: String,
        /// Wall-clock duration before failure was observed.
        duration_ms: u64,
    },
}

/// Errors that prevent [`Executor::execute`] from even producing an
/// [`ExecuteResult`] (as opposed to the result's own `Failure` variant,
/// which represents the executor tool itself reporting failure).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Streaming was requested but is not implemented.
    #[error("streaming execution is not implemented")]
    StreamingNotImplemented,
    /// A concurrently-spawned executor invocation panicked or was aborted
    /// before it could report a result (used by the batch handler, which
    /// runs each prompt in its own task).
    #[error("concurrent execution task failed: {0}")]
    JoinFailed(String),
}

/// The executor tool contract: a long-running subprocess invocation
/// producing a single JSON reply.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Invoke the executor tool once, enforcing `timeout` as a wall-clock
    /// budget timed from just before the subprocess is spawned to exit.
    ///
    /// A timeout is reported as `Ok(ExecuteResult::Failure { .. })`, not an
    /// `Err` — the scheduler treats it identically to any other executor
    /// failure, just with the literal message in
    /// [`crate::executor::claude_cli::TIMEOUT_ERROR_MESSAGE`].
    async fn execute(
        &self,
        request: ExecuteRequest,
        timeout: Duration,
    ) -> Result<ExecuteResult, ExecutorError>;
}
