#![allow(missing_docs)]

//! execbroker — CLI entry point.
//!
//! `serve` wires the persistent stores, the executor, the webhook
//! dispatcher, and the task scheduler behind an Axum HTTP server and runs
//! until a shutdown signal arrives. `check-config` is a one-shot
//! diagnostic that loads and validates configuration without starting
//! anything.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use execbroker::api::middleware::RateLimiter;
use execbroker::api::{routes, AppState};
use execbroker::config::BrokerConfig;
use execbroker::executor::claude_cli::ClaudeCliExecutor;
use execbroker::executor::Executor;
use execbroker::session::manager::SessionManager;
use execbroker::session::store::SessionStore;
use execbroker::stats::StatsStore;
use execbroker::task::scheduler::TaskScheduler;
use execbroker::task::store::TaskStore;

/// Soft deadline the scheduler waits for in-flight tasks to drain on
/// shutdown before abandoning them.
const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "execbroker", version, about = "HTTP-fronted execution broker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server and task scheduler.
    Serve,
    /// Load and validate configuration, then exit (0 if valid).
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve().await,
        Command::CheckConfig => check_config(),
    }
}

fn check_config() -> Result<()> {
    execbroker::logging::init_cli();
    let config = BrokerConfig::load().context("configuration is invalid")?;
    info!(
        port = config.server.port,
        data_dir = %config.data_dir.display(),
        "configuration is valid"
    );
    Ok(())
}

async fn serve() -> Result<()> {
    let config = BrokerConfig::load().context("failed to load configuration")?;

    let _logging_guard = match &config.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            Some(execbroker::logging::init_production(dir).context("failed to initialize logging")?)
        }
        None => {
            execbroker::logging::init_cli();
            None
        }
    };

    info!("execbroker starting");

    if let Some(pid_file) = &config.pid_file {
        std::fs::write(pid_file, std::process::id().to_string())
            .with_context(|| format!("failed to write pid file {}", pid_file.display()))?;
    }

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data directory {}", config.data_dir.display()))?;

    let task_store = Arc::new(
        TaskStore::open(config.data_dir.join("tasks.json"))
            .await
            .context("failed to open task store")?,
    );
    let session_store = Arc::new(
        SessionStore::open(config.data_dir.join("sessions.json"))
            .await
            .context("failed to open session store")?,
    );
    let stats_store = Arc::new(
        StatsStore::open(config.data_dir.join("statistics.json"))
            .await
            .context("failed to open statistics store")?,
    );

    let executor: Arc<dyn Executor> = Arc::new(ClaudeCliExecutor::new(config.executor_binary.clone()));
    let session_manager = Arc::new(SessionManager::new(
        Arc::clone(&session_store),
        Arc::clone(&executor),
        Duration::from_secs(config.task_queue.default_timeout_secs),
    ));

    let webhook = Arc::new(execbroker::webhook::WebhookDispatcher::new(
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
    let recovered = scheduler.start().await.context("failed to start task scheduler")?;
    if recovered > 0 {
        info!(recovered, "recovered interrupted tasks from a prior run");
    }

    let rate_limiter = config.rate_limit.enabled.then(|| {
        RateLimiter::new(
            Duration::from_millis(config.rate_limit.window_ms),
            config.rate_limit.max_requests,
        )
    });

    let state = Arc::new(AppState {
        task_store,
        session_manager,
        scheduler: Arc::clone(&scheduler),
        executor,
        webhook,
        stats: stats_store,
        config: Arc::new(config.clone()),
        rate_limiter,
        started_at: Instant::now(),
    });

    let app = routes::app_routes(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "execbroker listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    scheduler.stop(SHUTDOWN_DRAIN_DEADLINE).await;
    info!("execbroker shut down");
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, draining in-flight tasks");
}
