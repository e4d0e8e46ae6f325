use crate::support::{StubExecutor, TestApp};

#[tokio::test]
async fn create_get_and_list_task() {
    let app = TestApp::spawn().await;

    let create = app
        .client
        .post(app.url("/api/tasks/async"))
        .json(&serde_json::json!({"prompt": "do the thing", "priority": 8}))
        .send()
        .await
        .expect("create request");
    assert_eq!(create.status(), reqwest::StatusCode::CREATED);
    let created: serde_json::Value = create.json().await.expect("json body");
    let task_id = created["id"].as_str().expect("id string").to_owned();
    assert_eq!(created["priority"], 8);

    let get = app
        .client
        .get(app.url(&format!("/api/tasks/{task_id}")))
        .send()
        .await
        .expect("get request");
    assert_eq!(get.status(), reqwest::StatusCode::OK);
    let fetched: serde_json::Value = get.json().await.expect("json body");
    assert_eq!(fetched["id"], task_id);

    let list = app
        .client
        .get(app.url("/api/tasks"))
        .send()
        .await
        .expect("list request");
    assert_eq!(list.status(), reqwest::StatusCode::OK);
    let listed: serde_json::Value = list.json().await.expect("json body");
    let tasks = listed["tasks"].as_array().expect("tasks array");
    assert!(tasks.iter().any(|t| t["id"] == task_id));
}

#[tokio::test]
async fn get_unknown_task_is_404() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/api/tasks/does-not-exist"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn priority_patch_rejects_out_of_range() {
    let app = TestApp::spawn().await;

    let create = app
        .client
        .post(app.url("/api/tasks/async"))
        .json(&serde_json::json!({"prompt": "p"}))
        .send()
        .await
        .expect("create request");
    let created: serde_json::Value = create.json().await.expect("json body");
    let task_id = created["id"].as_str().expect("id string").to_owned();

    let patch = app
        .client
        .patch(app.url(&format!("/api/tasks/{task_id}/priority")))
        .json(&serde_json::json!({"priority": 99}))
        .send()
        .await
        .expect("patch request");
    assert_eq!(patch.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn priority_patch_unknown_task_is_404() {
    let app = TestApp::spawn().await;

    let patch = app
        .client
        .patch(app.url("/api/tasks/does-not-exist/priority"))
        .json(&serde_json::json!({"priority": 5}))
        .send()
        .await
        .expect("patch request");
    assert_eq!(patch.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_task_marks_it_cancelled() {
    // The blocking executor never returns, so the dispatched task is
    // guaranteed to still be `processing` (never `completed`) when the
    // cancel call lands, making the 200 outcome deterministic.
    let app = TestApp::spawn_with_executor(StubExecutor::blocking()).await;

    let create = app
        .client
        .post(app.url("/api/tasks/async"))
        .json(&serde_json::json!({"prompt": "cancel me"}))
        .send()
        .await
        .expect("create request");
    let created: serde_json::Value = create.json().await.expect("json body");
    let task_id = created["id"].as_str().expect("id string").to_owned();

    let cancel = app
        .client
        .delete(app.url(&format!("/api/tasks/{task_id}")))
        .send()
        .await
        .expect("cancel request");
    assert_eq!(cancel.status(), reqwest::StatusCode::OK);

    let get = app
        .client
        .get(app.url(&format!("/api/tasks/{task_id}")))
        .send()
        .await
        .expect("get request");
    let fetched: serde_json::Value = get.json().await.expect("json body");
    assert_eq!(fetched["status"], "cancelled");
}

#[tokio::test]
async fn cancel_unknown_task_is_404() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .delete(app.url("/api/tasks/does-not-exist"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_terminal_task_is_400() {
    let executor = StubExecutor::always_success();
    let app = TestApp::spawn_with_executor(executor).await;

    let create = app
        .client
        .post(app.url("/api/tasks/async"))
        .json(&serde_json::json!({"prompt": "finishes fast"}))
        .send()
        .await
        .expect("create request");
    let created: serde_json::Value = create.json().await.expect("json body");
    let task_id = created["id"].as_str().expect("id string").to_owned();

    let mut completed = false;
    for _ in 0..50 {
        let get = app
            .client
            .get(app.url(&format!("/api/tasks/{task_id}")))
            .send()
            .await
            .expect("get request");
        let fetched: serde_json::Value = get.json().await.expect("json body");
        if fetched["status"] == "completed" {
            completed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(completed, "task never completed within the polling budget");

    let cancel = app
        .client
        .delete(app.url(&format!("/api/tasks/{task_id}")))
        .send()
        .await
        .expect("cancel request");
    assert_eq!(cancel.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queue_status_reports_concurrency_and_stats() {
    let app = TestApp::spawn().await;

    app.client
        .post(app.url("/api/tasks/async"))
        .json(&serde_json::json!({"prompt": "q"}))
        .send()
        .await
        .expect("create request");

    let response = app
        .client
        .get(app.url("/api/tasks/queue/status"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["concurrency"], 4);
    assert!(body["total"].as_u64().unwrap_or_default() >= 1);
}

#[tokio::test]
async fn list_tasks_filters_by_status() {
    let executor = StubExecutor::always_success();
    let app = TestApp::spawn_with_executor(executor).await;

    app.client
        .post(app.url("/api/tasks/async"))
        .json(&serde_json::json!({"prompt": "will complete"}))
        .send()
        .await
        .expect("create request");

    // Give the dispatcher a moment to pick up and finish the task.
    for _ in 0..50 {
        let response = app
            .client
            .get(app.url("/api/tasks?status=completed"))
            .send()
            .await
            .expect("list request");
        let body: serde_json::Value = response.json().await.expect("json body");
        let tasks = body["tasks"].as_array().expect("tasks array");
        if !tasks.is_empty() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("task never reached completed status within the test's polling budget");
}

#[tokio::test]
async fn list_tasks_rejects_unknown_status() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/api/tasks?status=bogus"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

