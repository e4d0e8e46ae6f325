//! Thin orchestrator over [`SessionStore`], adding the one operation that
//! needs an executor: [`SessionManager::continue_session`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::executor::{ExecuteRequest, ExecuteResult, Executor, ExecutorError};
use crate::session::store::{SessionListFilter, SessionStore, SessionStoreError};
use crate::session::{NewSession, Session, SessionStats, SessionStatus};

/// Errors produced by [`SessionManager`] operations.
#[derive(Debug, Error)]
pub enum SessionManagerError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] SessionStoreError),
    /// The referenced session does not exist.
    #[error("session not found: {0}")]
    NotFound(String),
    /// The session is not `active` and cannot be continued.
    #[error("session {0} is not active")]
    NotActive(String),
    /// The executor itself rejected the request.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Parameters for [`SessionManager::continue_session`].
#[derive(Debug, Clone, Default)]
pub struct ContinueRequest {
    /// Prompt to send, continuing the session's conversation.
    pub prompt: String,
    /// System prompt override, if any.
    pub system_prompt: Option<String>,
    /// Maximum budget in USD for this continuation.
    pub max_budget_usd: Option<f64>,
    /// Whether streaming was requested (rejected — see
    /// [`crate::executor::ExecutorError::StreamingNotImplemented`]).
    pub stream: bool,
}

/// Orchestrates session CRUD and continuation over a [`SessionStore`] and
/// an [`Executor`].
pub struct SessionManager {
    store: Arc<SessionStore>,
    executor: Arc<dyn Executor>,
    default_timeout: Duration,
}

impl SessionManager {
    /// Build a manager over `store`, dispatching continuations to
    /// `executor` with `default_timeout` as the per-call wall-clock budget.
    pub fn new(store: Arc<SessionStore>, executor: Arc<dyn Executor>, default_timeout: Duration) -> Self {
        Self {
            store,
            executor,
            default_timeout,
        }
    }

    /// Create a new session.
    pub async fn create(&self, new: NewSession) -> Result<Session, SessionManagerError> {
        Ok(self.store.create(new).await?)
    }

    /// Fetch a session by id.
    pub async fn get(&self, id: &str) -> Option<Session> {
        self.store.get(id).await
    }

    /// List sessions matching `filter`.
    pub async fn list(&self, filter: SessionListFilter) -> Vec<Session> {
        self.store.list(filter).await
    }

    /// Search sessions by substring.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<Session> {
        self.store.search(query, limit).await
    }

    /// Delete a session by id.
    pub async fn delete(&self, id: &str) -> Result<bool, SessionManagerError> {
        Ok(self.store.delete(id).await?)
    }

    /// Update a session's status (e.g. archiving it).
    pub async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> Result<Session, SessionManagerError> {
        self.store
            .update_status(id, status)
            .await?
            .ok_or_else(|| SessionManagerError::NotFound(id.to_owned()))
    }

    /// Aggregate session counters.
    pub async fn get_stats(&self) -> SessionStats {
        self.store.get_stats().await
    }

    /// Purge sessions inactive for longer than `retention_days`.
    pub async fn cleanup_expired(&self, retention_days: i64) -> Result<usize, SessionManagerError> {
        Ok(self.store.cleanup(retention_days).await?)
    }

    /// Continue an existing session: refuses non-`active` sessions,
    /// otherwise invokes the executor with the session's stored
    /// `project_path`/`model`.
    pub async fn continue_session(
        &self,
        session_id: &str,
        request: ContinueRequest,
    ) -> Result<ExecuteResult, SessionManagerError> {
        let session = self
            .store
            .get(session_id)
            .await
            .ok_or_else(|| SessionManagerError::NotFound(session_id.to_owned()))?;

        if session.status != SessionStatus::Active {
            return Err(SessionManagerError::NotActive(session_id.to_owned()));
        }

        let exec_request = ExecuteRequest {
            prompt: request.prompt,
            project_path: session.project_path.clone(),
            model: Some(session.model.clone()),
            session_id: Some(session.id.clone()),
            system_prompt: request.system_prompt,
            max_budget_usd: request.max_budget_usd,
            stream: request.stream,
            ..Default::default()
        };

        let result = self
            .executor
            .execute(exec_request, self.default_timeout)
            .await?;

        if let ExecuteResult::Success { cost_usd, .. } = &result {
            let _ = self.store.add_cost(&session.id, *cost_usd).await;
            let _ = self.store.increment_messages(&session.id).await;
        }

        Ok(result)
    }
}
