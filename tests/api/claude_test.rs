use crate::support::{StubExecutor, TestApp};
use execbroker::executor::{ExecuteResult, Usage};

#[tokio::test]
async fn synchronous_execution_returns_result_and_cost() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/claude"))
        .json(&serde_json::json!({"prompt": "summarize this repo"}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["text"], "ok");
    assert!((body["cost_usd"].as_f64().unwrap_or_default() - 0.01).abs() < f64::EPSILON);
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/claude"))
        .json(&serde_json::json!({"prompt": ""}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn streaming_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/claude"))
        .json(&serde_json::json!({"prompt": "hi", "stream": true}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn async_execution_auto_creates_session_and_returns_task() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/claude"))
        .json(&serde_json::json!({"prompt": "background job", "async": true}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "pending");
    assert!(body["task_id"].is_string());
    assert!(body["session_id"].is_string());

    let task_id = body["task_id"].as_str().expect("task_id string").to_owned();
    let task = app
        .state
        .task_store
        .get(&task_id)
        .await
        .expect("task persisted");
    assert_eq!(task.prompt, "background job");
    assert!(task.session_id.is_some());
}

#[tokio::test]
async fn executor_failure_surfaces_as_unsuccessful_response() {
    let executor = StubExecutor::scripted(vec![Ok(ExecuteResult::Failure {
        error: "executor tool exited non-zero".to_owned(),
        duration_ms: 5,
    })]);
    let app = TestApp::spawn_with_executor(executor).await;

    let response = app
        .client
        .post(app.url("/api/claude"))
        .json(&serde_json::json!({"prompt": "will fail"}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["success"], true);
    assert_eq!(body["error"], "executor tool exited non-zero");
    assert!(body["result"].is_null());
}

#[tokio::test]
async fn batch_execution_reports_per_item_outcomes() {
    let executor = StubExecutor::scripted(vec![
        Ok(ExecuteResult::Success {
            result: serde_json::json!({"text": "first"}),
            duration_ms: 1,
            cost_usd: 0.02,
            session_id: None,
            usage: Usage {
                input_tokens: 1,
                output_tokens: 1,
            },
        }),
        Ok(ExecuteResult::Failure {
            error: "boom".to_owned(),
            duration_ms: 1,
        }),
    ]);
    let app = TestApp::spawn_with_executor(executor).await;

    let response = app
        .client
        .post(app.url("/api/claude/batch"))
        .json(&serde_json::json!({"prompts": [{"prompt": "a"}, {"prompt": "b"}]}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["summary"]["successful"], 1);
    assert_eq!(body["summary"]["failed"], 1);
    let results = body["results"].as_array().expect("results array");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[1]["success"], false);
}

#[tokio::test]
async fn batch_rejects_empty_prompt_list() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/claude/batch"))
        .json(&serde_json::json!({"prompts": []}))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}
