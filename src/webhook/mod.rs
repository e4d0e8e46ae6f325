//! At-least-once delivery of lifecycle events to an external HTTP callback,
//! with bounded exponential-backoff retry. Dispatch never blocks the
//! scheduler: each delivery runs as its own fire-and-forget task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Fixed `User-Agent` sent with every delivery.
const USER_AGENT: &str = concat!("execbroker/", env!("CARGO_PKG_VERSION"));

/// Lifecycle events the broker may emit. `Custom` covers arbitrary
/// caller-supplied event names sent through the custom API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A task finished successfully.
    TaskCompleted,
    /// A task's executor invocation failed.
    TaskFailed,
    /// A task's wall-clock budget expired.
    TaskTimeout,
    /// An unexpected internal error prevented a task from running.
    TaskError,
    /// A task was cancelled before completion.
    TaskCancelled,
    /// A session was created.
    SessionCreated,
    /// A session was deleted.
    SessionDeleted,
    /// A caller-supplied event name, sent as-is.
    Custom(String),
}

impl WebhookEvent {
    /// The wire name used in the event envelope's `event` field.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::TaskTimeout => "task.timeout",
            Self::TaskError => "task.error",
            Self::TaskCancelled => "task.cancelled",
            Self::SessionCreated => "session.created",
            Self::SessionDeleted => "session.deleted",
            Self::Custom(name) => name,
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookEnvelope {
    event: String,
    timestamp: DateTime<Utc>,
    data: serde_json::Value,
}

/// Reason a delivery was skipped rather than attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither a per-delivery override nor a configured default URL exist.
    NoUrl,
}

/// Outcome of [`WebhookDispatcher::dispatch`], useful mainly for tests —
/// production callers fire-and-forget and ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered with a 2xx response on the given attempt (1-based).
    Delivered { attempt: u32 },
    /// All attempts exhausted without a 2xx response.
    Exhausted { attempts: u32, last_error: String },
    /// No target URL was available.
    Skipped(SkipReason),
}

/// Delivers lifecycle events over HTTP with bounded retry.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    default_url: Option<String>,
    max_retries: u32,
    timeout: Duration,
}

impl WebhookDispatcher {
    /// Build a dispatcher. `default_url` is used when a delivery carries no
    /// per-call override. `max_retries` bounds delivery attempts (default
    /// 3); `timeout` bounds each individual HTTP attempt.
    pub fn new(default_url: Option<String>, max_retries: u32, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_url,
            max_retries,
            timeout,
        }
    }

    /// Resolve the delivery target: `override_url` if present, else the
    /// configured default.
    fn resolve_url<'a>(&'a self, override_url: Option<&'a str>) -> Option<&'a str> {
        override_url.or(self.default_url.as_deref())
    }

    /// Fire off delivery of `event` with `data` as the payload body,
    /// spawning a detached task so the caller never waits on network I/O.
    /// `override_url` is the per-task webhook URL from task metadata, if
    /// any.
    pub fn dispatch(
        &self,
        event: WebhookEvent,
        data: serde_json::Value,
        override_url: Option<String>,
    ) {
        let Some(url) = self.resolve_url(override_url.as_deref()).map(str::to_owned) else {
            debug!(event = event.as_str(), "webhook skipped: no url configured");
            return;
        };

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.deliver(&url, event, data).await;
        });
    }

    /// Attempt delivery with retry, used directly by [`Self::dispatch`]'s
    /// spawned task and by tests that want the outcome synchronously.
    async fn deliver(
        &self,
        url: &str,
        event: WebhookEvent,
        data: serde_json::Value,
    ) -> DispatchOutcome {
        let envelope = WebhookEnvelope {
            event: event.as_str().to_owned(),
            timestamp: Utc::now(),
            data,
        };

        let mut last_error = String::new();
        let attempts = self.max_retries.max(1);

        for attempt in 1..=attempts {
            let result = self
                .client
                .post(url)
                .timeout(self.timeout)
                .header("Content-Type", "application/json")
                .header("User-Agent", USER_AGENT)
                .json(&envelope)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    return DispatchOutcome::Delivered { attempt };
                }
                Ok(response) => {
                    last_error = format!("http status {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                let backoff_secs = 2u64.saturating_pow(attempt.saturating_sub(1)).min(10);
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }
        }

        warn!(
            event = envelope.event,
            url, last_error, "webhook delivery exhausted retries"
        );
        DispatchOutcome::Exhausted {
            attempts,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Spawn a tiny Axum responder on an ephemeral port that returns
    /// `statuses[n]` on its `n`th call, then `200 OK` once the script runs
    /// dry. Returns the hook URL and a counter of calls received.
    async fn spawn_sequenced_responder(
        statuses: Vec<axum::http::StatusCode>,
    ) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let statuses = Arc::new(statuses);
        let handler_hits = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/hook",
            axum::routing::post(move || {
                let hits = Arc::clone(&handler_hits);
                let statuses = Arc::clone(&statuses);
                async move {
                    let index = hits.fetch_add(1, Ordering::SeqCst);
                    statuses.get(index).copied().unwrap_or(axum::http::StatusCode::OK)
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (format!("http://{addr}/hook"), hits)
    }

    #[tokio::test]
    async fn delivery_succeeds_after_two_retriable_failures() {
        let (url, hits) = spawn_sequenced_responder(vec![
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::http::StatusCode::OK,
        ])
        .await;

        let dispatcher = WebhookDispatcher::new(None, 3, Duration::from_secs(2));
        let outcome = dispatcher
            .deliver(&url, WebhookEvent::TaskCompleted, serde_json::json!({"task_id": "abc"}))
            .await;

        assert!(matches!(outcome, DispatchOutcome::Delivered { attempt: 3 }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn resolve_url_prefers_override() {
        let dispatcher = WebhookDispatcher::new(
            Some("https://default.example/hook".to_owned()),
            3,
            Duration::from_secs(5),
        );
        assert_eq!(
            dispatcher.resolve_url(Some("https://override.example/hook")),
            Some("https://override.example/hook")
        );
        assert_eq!(
            dispatcher.resolve_url(None),
            Some("https://default.example/hook")
        );
    }

    #[tokio::test]
    async fn dispatch_without_url_spawns_nothing_reachable() {
        let dispatcher = WebhookDispatcher::new(None, 3, Duration::from_secs(5));
        // With no default and no override, resolve_url is None and dispatch
        // returns without spawning a delivery task at all.
        dispatcher.dispatch(WebhookEvent::TaskCompleted, serde_json::json!({}), None);
        assert_eq!(dispatcher.resolve_url(None), None);
    }

    #[tokio::test]
    async fn delivery_against_unreachable_host_exhausts_retries() {
        let dispatcher = WebhookDispatcher::new(None, 2, Duration::from_millis(200));
        let outcome = dispatcher
            .deliver(
                "http://127.0.0.1:0",
                WebhookEvent::TaskFailed,
                serde_json::json!({"task_id": "abc"}),
            )
            .await;
        assert!(matches!(outcome, DispatchOutcome::Exhausted { attempts: 2, .. }));
    }

    #[test]
    fn event_names_use_dotted_wire_format() {
        assert_eq!(WebhookEvent::TaskCompleted.as_str(), "task.completed");
        assert_eq!(WebhookEvent::TaskTimeout.as_str(), "task.timeout");
        assert_eq!(
            WebhookEvent::Custom("widget.built".to_owned()).as_str(),
            "widget.built"
        );
    }
}
