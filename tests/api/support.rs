//! Shared harness for `tests/api.rs`'s submodules.
//!
//! Boots the real Axum app over an ephemeral TCP port, backed by
//! tempdir-isolated stores and a scripted [`Executor`], then drives it with
//! a plain `reqwest::Client` — the same shape the task orchestration
//! subsystem's own scheduler tests use, just over the wire instead of in
//! process.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use execbroker::api::middleware::RateLimiter;
use execbroker::api::{routes, AppState};
use execbroker::config::BrokerConfig;
use execbroker::executor::{ExecuteRequest, ExecuteResult, Executor, ExecutorError};
use execbroker::session::manager::SessionManager;
use execbroker::session::store::SessionStore;
use execbroker::stats::StatsStore;
use execbroker::task::scheduler::TaskScheduler;
use execbroker::task::store::TaskStore;
use execbroker::webhook::WebhookDispatcher;

/// An [`Executor`] whose replies are scripted in advance; falls back to a
/// fixed success once the script runs dry, so tests that only care about
/// the first call don't need to size the queue exactly.
pub struct StubExecutor {
    outcomes: Mutex<VecDeque<Result<ExecuteResult, ExecutorError>>>,
    block: bool,
}

impl StubExecutor {
    /// An executor that always reports the same successful result.
    pub fn always_success() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            block: false,
        })
    }

    /// An executor whose calls are served from `outcomes` in order.
    pub fn scripted(outcomes: Vec<Result<ExecuteResult, ExecutorError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            block: false,
        })
    }

    /// An executor that never returns, so a dispatched task stays
    /// `processing` for the test's lifetime — useful for exercising
    /// cancellation of a task that is definitely still in flight.
    pub fn blocking() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            block: true,
        })
    }
}

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(
        &self,
        _request: ExecuteRequest,
        _timeout: Duration,
    ) -> Result<ExecuteResult, ExecutorError> {
        if self.block {
            std::future::pending::<()>().await;
        }
        if let Some(outcome) = self.outcomes.lock().await.pop_front() {
            return outcome;
        }
        Ok(ExecuteResult::Success {
            result: serde_json::json!({"text": "ok"}),
            duration_ms: 1,
            cost_usd: 0.01,
            session_id: None,
            usage: execbroker::executor::Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }
}

/// A running instance of the app under test, plus the HTTP client used to
/// reach it. The tempdir is held for the test's lifetime so the stores'
/// backing files aren't removed mid-test.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    /// Spawn the app with an always-succeeding executor and default
    /// configuration (rate limiting enabled, 120 requests/minute).
    pub async fn spawn() -> Self {
        Self::spawn_with(StubExecutor::always_success(), |_| {}).await
    }

    /// Spawn the app with a caller-supplied executor.
    pub async fn spawn_with_executor(executor: Arc<dyn Executor>) -> Self {
        Self::spawn_with(executor, |_| {}).await
    }

    /// Spawn the app with a caller-supplied executor and a chance to tweak
    /// configuration (e.g. tighten the rate limit window) before boot.
    pub async fn spawn_with(
        executor: Arc<dyn Executor>,
        configure: impl FnOnce(&mut BrokerConfig),
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut config = BrokerConfig::default();
        config.data_dir = dir.path().to_path_buf();
        configure(&mut config);

        let task_store = Arc::new(
            TaskStore::open(dir.path().join("tasks.json"))
                .await
                .expect("open task store"),
        );
        let session_store = Arc::new(
            SessionStore::open(dir.path().join("sessions.json"))
                .await
                .expect("open session store"),
        );
        let stats_store = Arc::new(
            StatsStore::open(dir.path().join("statistics.json"))
                .await
                .expect("open stats store"),
        );

        let session_manager = Arc::new(SessionManager::new(
            Arc::clone(&session_store),
            Arc::clone(&executor),
            Duration::from_secs(config.task_queue.default_timeout_secs),
        ));
        let webhook = Arc::new(WebhookDispatcher::new(
            config.webhook.default_url.clone(),
            config.webhook.retries,
            Duration::from_secs(config.webhook.timeout_secs),
        ));

        let scheduler = TaskScheduler::new(
            Arc::clone(&task_store),
            Arc::clone(&session_store),
            Arc::clone(&stats_store),
            Arc::clone(&executor),
            Arc::clone(&webhook),
            config.task_queue.concurrency,
            Duration::from_millis(config.task_queue.poll_interval_ms),
            Duration::from_secs(config.task_queue.default_timeout_secs),
        );
        scheduler.start().await.expect("start scheduler");

        let rate_limiter = config.rate_limit.enabled.then(|| {
            RateLimiter::new(
                Duration::from_millis(config.rate_limit.window_ms),
                config.rate_limit.max_requests,
            )
        });

        let state = Arc::new(AppState {
            task_store,
            session_manager,
            scheduler,
            executor,
            webhook,
            stats: stats_store,
            config: Arc::new(config),
            rate_limiter,
            started_at: Instant::now(),
        });

        let app = routes::app_routes(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await
            .ok();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            state,
            _dir: dir,
        }
    }

    /// Build a full URL for `path` (which should start with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
