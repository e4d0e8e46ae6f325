//! Subprocess-backed [`Executor`] invoking a configured command-line
//! executor tool binary and parsing its single JSON stdout reply.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ExecuteRequest, ExecuteResult, Executor, ExecutorError, Usage};

/// Literal error message recorded when a task's wall-clock budget expires.
/// The scheduler matches on this exact string to decide whether to emit a
/// `task.timeout` webhook event instead of `task.failed`.
pub const TIMEOUT_ERROR_MESSAGE: &str = "Task execution timeout";

/// The JSON document the executor tool is expected to write to stdout on
/// success: at least `result`, `total_cost_usd`,
/// `session_id`, and usage fields.
#[derive(Debug, Deserialize)]
struct ExecutorReply {
    result: serde_json::Value,
    total_cost_usd: f64,
    session_id: Option<String>,
    #[serde(default)]
    usage: Usage,
}

/// Invokes the executor tool as a child process via `tokio::process`.
#[derive(Debug, Clone)]
pub struct ClaudeCliExecutor {
    binary: String,
}

impl ClaudeCliExecutor {
    /// Create an executor that shells out to `binary` (resolved through
    /// `$PATH` unless an absolute path is given).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_command(&self, request: &ExecuteRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&request.project_path)
            .arg("-p")
            .arg(&request.prompt)
            .arg("--output-format")
            .arg("json")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(session_id) = &request.session_id {
            cmd.arg("--resume").arg(session_id);
        }
        if let Some(system_prompt) = &request.system_prompt {
            cmd.arg("--system-prompt").arg(system_prompt);
        }
        if let Some(max_budget) = request.max_budget_usd {
            cmd.arg("--max-budget-usd").arg(max_budget.to_string());
        }
        if let Some(allowed) = &request.allowed_tools {
            cmd.arg("--allowed-tools").arg(allowed.join(","));
        }
        if let Some(disallowed) = &request.disallowed_tools {
            cmd.arg("--disallowed-tools").arg(disallowed.join(","));
        }
        if let Some(agent) = &request.agent {
            cmd.arg("--agent").arg(agent);
        }
        if let Some(mcp_config) = &request.mcp_config {
            cmd.arg("--mcp-config").arg(mcp_config);
        }

        cmd
    }
}

#[async_trait]
impl Executor for ClaudeCliExecutor {
    async fn execute(
        &self,
        request: ExecuteRequest,
        timeout: Duration,
    ) -> Result<ExecuteResult, ExecutorError> {
        if request.stream {
            return Err(ExecutorError::StreamingNotImplemented);
        }

        let mut command = self.build_command(&request);
        let start = Instant::now();

        let run = async {
            let child = command
                .spawn()
                .map_err(|e| format!("failed to spawn executor tool: {e}"))?;
            child
                .wait_with_output()
                .await
                .map_err(|e| format!("executor tool I/O error: {e}"))
        };

        let outcome = tokio::time::timeout(timeout, run).await;
        let elapsed_ms = duration_ms(start.elapsed());

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(spawn_err)) => {
                return Ok(ExecuteResult::Failure {
                    error: spawn_err,
                    duration_ms: elapsed_ms,
                })
            }
            Err(_elapsed) => {
                warn!("executor tool exceeded timeout of {timeout:?}, killing child");
                return Ok(ExecuteResult::Failure {
                    error: TIMEOUT_ERROR_MESSAGE.to_owned(),
                    duration_ms: elapsed_ms,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ExecuteResult::Failure {
                error: format!(
                    "executor tool exited with status {}: {}",
                    output.status,
                    stderr.trim()
                ),
                duration_ms: elapsed_ms,
            });
        }

        match serde_json::from_slice::<ExecutorReply>(&output.stdout) {
            Ok(reply) => {
                debug!(
                    cost_usd = reply.total_cost_usd,
                    session_id = ?reply.session_id,
                    "executor tool reply parsed"
                );
                Ok(ExecuteResult::Success {
                    result: reply.result,
                    duration_ms: elapsed_ms,
                    cost_usd: reply.total_cost_usd,
                    session_id: reply.session_id,
                    usage: reply.usage,
                })
            }
            Err(e) => Ok(ExecuteResult::Failure {
                error: format!("unparseable executor tool output: {e}"),
                duration_ms: elapsed_ms,
            }),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
