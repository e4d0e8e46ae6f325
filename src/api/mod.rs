//! HTTP API surface: a thin external-facing layer over the task
//! orchestration subsystem. Owns request/response shapes ([`dto`]),
//! handlers ([`handlers`]), router assembly ([`routes`]), and rate-limiting
//! middleware ([`middleware`]).

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use crate::api::middleware::RateLimiter;
use crate::config::BrokerConfig;
use crate::executor::Executor;
use crate::session::manager::SessionManager;
use crate::stats::StatsStore;
use crate::task::scheduler::TaskScheduler;
use crate::task::store::TaskStore;

/// Shared state reachable from every handler.
pub struct AppState {
    /// Direct task persistence access (reads, and the sync creation path).
    pub task_store: Arc<TaskStore>,
    /// Session CRUD and continuation orchestration.
    pub session_manager: Arc<SessionManager>,
    /// Drives queued tasks; handlers delegate cancellation and priority
    /// changes to it so the in-memory `active` set stays authoritative.
    pub scheduler: Arc<TaskScheduler>,
    /// Direct executor access for the synchronous `/api/claude` paths.
    pub executor: Arc<dyn Executor>,
    /// Unused directly by handlers today, kept for parity with the
    /// scheduler's webhook wiring should a handler ever need to fire an
    /// ad-hoc event.
    pub webhook: Arc<crate::webhook::WebhookDispatcher>,
    /// Request-level statistics sink.
    pub stats: Arc<StatsStore>,
    /// Resolved configuration, read by handlers for defaults/limits.
    pub config: Arc<BrokerConfig>,
    /// Per-remote-address fixed-window limiter; `None` when rate limiting
    /// is disabled in configuration.
    pub rate_limiter: Option<RateLimiter>,
    /// Process start time, for `GET /healthz`'s `uptime_s`.
    pub started_at: Instant,
}
