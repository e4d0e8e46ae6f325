//! Crate-wide error taxonomy and its HTTP mapping.
//!
//! Leaf modules own precise `thiserror` enums (`StoreError`, `TaskStoreError`,
//! `SessionStoreError`, `ExecutorError`, ...); this module flattens them at
//! the HTTP boundary into one enum with a single `IntoResponse` impl, so the
//! API layer never has to match on a dozen distinct error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::session::manager::SessionManagerError;
use crate::session::store::SessionStoreError;
use crate::store::StoreError;
use crate::task::scheduler::SchedulerError;
use crate::task::store::TaskStoreError;

/// Crate-wide error type returned by API handlers.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Request failed validation (bad priority range, empty prompt, ...).
    #[error("{0}")]
    Validation(String),
    /// The referenced task or session does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The requested operation is illegal for the entity's current state
    /// (e.g. cancelling a terminal task, continuing an archived session).
    #[error("{0}")]
    InvalidState(String),
    /// Underlying JSON-document persistence failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<StoreError> for BrokerError {
    fn from(e: StoreError) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<TaskStoreError> for BrokerError {
    fn from(e: TaskStoreError) -> Self {
        match e {
            TaskStoreError::Store(inner) => Self::Persistence(inner.to_string()),
        }
    }
}

impl From<SessionStoreError> for BrokerError {
    fn from(e: SessionStoreError) -> Self {
        match e {
            SessionStoreError::Store(inner) => Self::Persistence(inner.to_string()),
        }
    }
}

impl From<SchedulerError> for BrokerError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Store(inner) => inner.into(),
        }
    }
}

impl From<SessionManagerError> for BrokerError {
    fn from(e: SessionManagerError) -> Self {
        match e {
            SessionManagerError::Store(inner) => inner.into(),
            SessionManagerError::NotFound(id) => Self::NotFound(format!("session not found: {id}")),
            SessionManagerError::NotActive(id) => {
                Self::InvalidState(format!("session {id} is not active"))
            }
            SessionManagerError::Executor(inner) => Self::Validation(inner.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: String,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorEnvelope {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
