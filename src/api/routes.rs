//! Router assembly: wires every handler to its path and method.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::{middleware, Router};

use crate::api::{handlers, middleware as broker_middleware, AppState};

/// Build the full application router over `state`.
pub fn app_routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/claude", post(handlers::execute))
        .route("/api/claude/batch", post(handlers::execute_batch))
        .route("/api/tasks/async", post(handlers::create_task))
        .route("/api/tasks/queue/status", get(handlers::queue_status))
        .route("/api/tasks/{id}", get(handlers::get_task).delete(handlers::cancel_task))
        .route("/api/tasks/{id}/priority", patch(handlers::update_task_priority))
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/sessions/search", get(handlers::search_sessions))
        .route("/api/sessions/stats", get(handlers::session_stats))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/sessions/{id}/archive", post(handlers::archive_session))
        .route("/api/sessions/{id}/continue", post(handlers::continue_session))
        .route("/api/sessions", post(handlers::create_session).get(handlers::list_sessions))
        .route("/api/stats", get(handlers::stats));

    Router::new()
        .route("/healthz", get(handlers::health))
        .merge(api)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), broker_middleware::rate_limit))
        .with_state(state)
}
