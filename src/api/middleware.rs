//! Fixed-window rate limiting, keyed by remote address.
//!
//! Adapted from the sliding-window tool-call limiter this crate's ancestor
//! uses to throttle agent tool invocations: a per-key deque of recent call
//! timestamps, trimmed to the window on each check. Here the key is the
//! client's socket address and the limiter sits in front of every request
//! as Axum middleware instead of gating a single tool call.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::api::AppState;

/// Per-key sliding window of recent request timestamps.
///
/// Uses a sync [`Mutex`] since the critical section never awaits.
pub struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    /// Build a limiter allowing `max_requests` per `window` per remote
    /// address.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    /// Record this request and report whether it is within the limit.
    fn check_and_record(&self, key: IpAddr) -> bool {
        let cutoff = Instant::now().checked_sub(self.window).unwrap_or_else(Instant::now);
        let Ok(mut windows) = self.windows.lock() else {
            return true;
        };
        let entry = windows.entry(key).or_default();
        while entry.front().is_some_and(|t| *t < cutoff) {
            entry.pop_front();
        }
        let count = u32::try_from(entry.len()).unwrap_or(u32::MAX);
        if count >= self.max_requests {
            return false;
        }
        entry.push_back(Instant::now());
        true
    }
}

/// Axum middleware enforcing [`AppState::rate_limiter`] when configured.
///
/// Requests from a client without an extractable [`ConnectInfo`] (e.g. a
/// test harness that does not wire `into_make_service_with_connect_info`)
/// are never limited.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<std::net::SocketAddr>>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(request).await;
    };
    let Some(ConnectInfo(addr)) = connect_info else {
        return next.run(request).await;
    };

    if limiter.check_and_record(addr.ip()) {
        next.run(request).await
    } else {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"success": false, "error": "rate limit exceeded"})),
        )
            .into_response()
    }
}
