//! Request handlers. Each function extracts [`AppState`], validates its
//! body/query via `api::dto`, and returns either an [`ApiResponse`]
//! envelope or a [`BrokerError`] (whose `IntoResponse` impl produces the
//! error envelope).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::dto::{
    ApiResponse, BatchItemResult, BatchRequestBody, BatchResponse, BatchSummary,
    ContinueSessionBody, ExecuteRequestBody, HealthStatus, NewTaskBody, PriorityPatchBody,
    QueueStatus, SessionListQuery, SessionListResponse, SessionSearchQuery, StatsResponse,
    TaskListQuery, TaskListResponse,
};
use crate::api::AppState;
use crate::error::BrokerError;
use crate::executor::ExecuteResult;
use crate::session::manager::ContinueRequest;
use crate::session::{NewSession, SessionStatus};
use crate::stats::RequestRecord;
use crate::task::store::TaskListFilter;
use crate::task::{NewTask, TaskStatus, UpdateOutcome};

fn parse_task_status(raw: &str) -> Result<TaskStatus, BrokerError> {
    match raw {
        "pending" => Ok(TaskStatus::Pending),
        "processing" => Ok(TaskStatus::Processing),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(BrokerError::Validation(format!("unknown task status: {other}"))),
    }
}

fn parse_session_status(raw: &str) -> Result<SessionStatus, BrokerError> {
    match raw {
        "active" => Ok(SessionStatus::Active),
        "archived" => Ok(SessionStatus::Archived),
        other => Err(BrokerError::Validation(format!("unknown session status: {other}"))),
    }
}

/// `GET /healthz`.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        uptime_s: state.started_at.elapsed().as_secs(),
    })
}

/// `POST /api/claude`.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteRequestBody>,
) -> Result<axum::response::Response, BrokerError> {
    body.validate()?;

    if body.r#async {
        let priority = body.priority;
        let project_path = body.project_path.clone();
        let model = body.model.clone();
        let session_id = body.session_id.clone();
        let webhook_url = body.webhook_url.clone();
        let prompt = body.prompt.clone();
        let metadata = body.metadata.clone();

        let session_id = match session_id {
            Some(id) => Some(id),
            None => Some(
                state
                    .session_manager
                    .create(NewSession {
                        model: model.clone(),
                        project_path: project_path.clone(),
                        metadata: None,
                    })
                    .await?
                    .id,
            ),
        };

        let mut new_task_metadata = metadata.unwrap_or_default();
        if let Some(url) = &webhook_url {
            new_task_metadata.insert(
                "webhook_url".to_owned(),
                serde_json::Value::String(url.clone()),
            );
        }

        let task = state
            .task_store
            .create(NewTask {
                priority,
                prompt,
                project_path,
                model,
                session_id,
                metadata: if new_task_metadata.is_empty() {
                    None
                } else {
                    Some(new_task_metadata)
                },
            })
            .await?;

        let body = serde_json::json!({
            "task_id": task.id,
            "status": task.status,
            "priority": task.priority,
            "session_id": task.session_id,
            "webhook_url": webhook_url,
        });
        return Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(body))).into_response());
    }

    let request = body.into_execute_request(&state.config.default_project_path, &state.config.default_model);
    let outcome = state
        .executor
        .execute(request, std::time::Duration::from_secs(state.config.task_queue.default_timeout_secs))
        .await
        .map_err(|e| BrokerError::Validation(e.to_string()))?;

    let (success, cost_usd, result, error, input_tokens, output_tokens) = match &outcome {
        ExecuteResult::Success {
            result, cost_usd, usage, ..
        } => (true, *cost_usd, Some(result.clone()), None, usage.input_tokens, usage.output_tokens),
        ExecuteResult::Failure { error, .. } => (false, 0.0, None, Some(error.clone()), 0, 0),
    };

    state
        .stats
        .record_request(RequestRecord {
            success,
            model: Some(state.config.default_model.clone()),
            input_tokens,
            output_tokens,
            cost_usd,
        })
        .await
        .ok();

    let body = serde_json::json!({"result": result, "error": error, "cost_usd": cost_usd});
    Ok(Json(ApiResponse::ok(body)).into_response())
}

/// `POST /api/claude/batch`.
pub async fn execute_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BatchRequestBody>,
) -> Result<Json<ApiResponse<BatchResponse>>, BrokerError> {
    body.validate()?;

    let default_project_path = state.config.default_project_path.clone();
    let default_model = state.config.default_model.clone();
    let timeout = std::time::Duration::from_secs(state.config.task_queue.default_timeout_secs);

    let handles: Vec<_> = body
        .prompts
        .into_iter()
        .map(|item| {
            let state = Arc::clone(&state);
            let default_project_path = default_project_path.clone();
            let default_model = default_model.clone();
            tokio::spawn(async move {
                let request = item.into_execute_request(&default_project_path, &default_model);
                state.executor.execute(request, timeout).await
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => outcomes.push(result),
            Err(e) => outcomes.push(Err(crate::executor::ExecutorError::JoinFailed(e.to_string()))),
        }
    }

    let mut results = Vec::with_capacity(outcomes.len());
    let mut summary = BatchSummary {
        total: outcomes.len(),
        ..BatchSummary::default()
    };

    for outcome in outcomes {
        let item = match outcome {
            Ok(ExecuteResult::Success { result, cost_usd, usage, .. }) => {
                summary.successful += 1;
                summary.total_cost_usd += cost_usd;
                state
                    .stats
                    .record_request(RequestRecord {
                        success: true,
                        model: Some(default_model.clone()),
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        cost_usd,
                    })
                    .await
                    .ok();
                BatchItemResult { success: true, result: Some(result), error: None, cost_usd }
            }
            Ok(ExecuteResult::Failure { error, .. }) => {
                summary.failed += 1;
                state
                    .stats
                    .record_request(RequestRecord {
                        success: false,
                        model: Some(default_model.clone()),
                        input_tokens: 0,
                        output_tokens: 0,
                        cost_usd: 0.0,
                    })
                    .await
                    .ok();
                BatchItemResult { success: false, result: None, error: Some(error), cost_usd: 0.0 }
            }
            Err(e) => {
                summary.failed += 1;
                BatchItemResult { success: false, result: None, error: Some(e.to_string()), cost_usd: 0.0 }
            }
        };
        results.push(item);
    }

    Ok(Json(ApiResponse::ok(BatchResponse { results, summary })))
}

/// `POST /api/tasks/async`.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewTaskBody>,
) -> Result<(StatusCode, Json<ApiResponse<crate::task::Task>>), BrokerError> {
    body.validate()?;
    let new_task = body.into_new_task(&state.config.default_project_path, &state.config.default_model);
    let task = state.task_store.create(new_task).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(task))))
}

/// `GET /api/tasks/:id`.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<crate::task::Task>>, BrokerError> {
    let task = state
        .task_store
        .get(&id)
        .await
        .ok_or_else(|| BrokerError::NotFound(format!("task not found: {id}")))?;
    Ok(Json(ApiResponse::ok(task)))
}

/// `PATCH /api/tasks/:id/priority`.
pub async fn update_task_priority(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<PriorityPatchBody>,
) -> Result<Json<ApiResponse<serde_json::Value>>, BrokerError> {
    body.validate()?;
    match state.scheduler.update_priority(&id, body.priority).await? {
        UpdateOutcome::Updated(_) => {
            Ok(Json(ApiResponse::ok(serde_json::json!({"id": id, "priority": body.priority}))))
        }
        UpdateOutcome::NotFound => Err(BrokerError::NotFound(format!("task not found: {id}"))),
        UpdateOutcome::Terminal => Err(BrokerError::InvalidState(format!(
            "task {id} is already in a terminal status"
        ))),
    }
}

/// `DELETE /api/tasks/:id`.
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, BrokerError> {
    match state.scheduler.cancel_task(&id).await? {
        UpdateOutcome::Updated(_) => {
            Ok(Json(ApiResponse::ok(serde_json::json!({"id": id, "status": "cancelled"}))))
        }
        UpdateOutcome::NotFound => Err(BrokerError::NotFound(format!("task not found: {id}"))),
        UpdateOutcome::Terminal => Err(BrokerError::InvalidState(format!(
            "task {id} is already in a terminal status"
        ))),
    }
}

/// `GET /api/tasks?status=&limit=`.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<ApiResponse<TaskListResponse>>, BrokerError> {
    let status = query.status.as_deref().map(parse_task_status).transpose()?;
    let tasks = state
        .task_store
        .list(TaskListFilter {
            status,
            limit: query.limit,
        })
        .await;
    Ok(Json(ApiResponse::ok(TaskListResponse { tasks })))
}

/// `GET /api/tasks/queue/status`.
pub async fn queue_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<QueueStatus>> {
    let stats = state.task_store.get_stats().await;
    let active_tasks = state.scheduler.active_count().await;
    Json(ApiResponse::ok(QueueStatus {
        running: true,
        active_tasks,
        concurrency: state.config.task_queue.concurrency,
        stats,
    }))
}

/// `POST /api/sessions`.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewSession>,
) -> Result<(StatusCode, Json<ApiResponse<crate::session::Session>>), BrokerError> {
    let session = state.session_manager.create(body).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(session))))
}

/// `GET /api/sessions/:id`.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<crate::session::Session>>, BrokerError> {
    let session = state
        .session_manager
        .get(&id)
        .await
        .ok_or_else(|| BrokerError::NotFound(format!("session not found: {id}")))?;
    Ok(Json(ApiResponse::ok(session)))
}

/// `GET /api/sessions?status=&project_path=&limit=`.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<ApiResponse<SessionListResponse>>, BrokerError> {
    let status = query.status.as_deref().map(parse_session_status).transpose()?;
    let sessions = state
        .session_manager
        .list(crate::session::store::SessionListFilter {
            status,
            project_path: query.project_path,
            limit: query.limit,
        })
        .await;
    Ok(Json(ApiResponse::ok(SessionListResponse { sessions })))
}

/// `GET /api/sessions/search?q=&limit=`.
pub async fn search_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionSearchQuery>,
) -> Json<ApiResponse<SessionListResponse>> {
    let sessions = state.session_manager.search(&query.q, query.limit).await;
    Json(ApiResponse::ok(SessionListResponse { sessions }))
}

/// `DELETE /api/sessions/:id`.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, BrokerError> {
    let deleted = state.session_manager.delete(&id).await?;
    if !deleted {
        return Err(BrokerError::NotFound(format!("session not found: {id}")));
    }
    Ok(Json(ApiResponse::ok(serde_json::json!({"id": id, "deleted": true}))))
}

/// `POST /api/sessions/:id/archive`.
pub async fn archive_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<crate::session::Session>>, BrokerError> {
    let session = state
        .session_manager
        .update_status(&id, SessionStatus::Archived)
        .await?;
    Ok(Json(ApiResponse::ok(session)))
}

/// `POST /api/sessions/:id/continue`.
pub async fn continue_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ContinueSessionBody>,
) -> Result<Json<ApiResponse<serde_json::Value>>, BrokerError> {
    body.validate()?;
    let outcome = state
        .session_manager
        .continue_session(
            &id,
            ContinueRequest {
                prompt: body.prompt,
                system_prompt: body.system_prompt,
                max_budget_usd: body.max_budget_usd,
                stream: body.stream,
            },
        )
        .await?;

    let payload = match outcome {
        ExecuteResult::Success { result, cost_usd, .. } => {
            serde_json::json!({"success": true, "result": result, "cost_usd": cost_usd})
        }
        ExecuteResult::Failure { error, .. } => {
            serde_json::json!({"success": false, "error": error})
        }
    };
    Ok(Json(ApiResponse::ok(payload)))
}

/// `GET /api/sessions/stats`.
pub async fn session_stats(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<crate::session::SessionStats>> {
    Json(ApiResponse::ok(state.session_manager.get_stats().await))
}

/// `GET /api/stats`.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatsResponse>> {
    let daily = state.stats.daily().await;
    let aggregate = state.stats.aggregate().await;
    Json(ApiResponse::ok(StatsResponse { daily, aggregate }))
}
