use crate::support::TestApp;

#[tokio::test]
async fn create_get_list_and_archive_session() {
    let app = TestApp::spawn().await;

    let create = app
        .client
        .post(app.url("/api/sessions"))
        .json(&serde_json::json!({"project_path": "/workspace/demo"}))
        .send()
        .await
        .expect("create request");
    assert_eq!(create.status(), reqwest::StatusCode::CREATED);
    let created: serde_json::Value = create.json().await.expect("json body");
    let session_id = created["id"].as_str().expect("id string").to_owned();
    assert_eq!(created["status"], "active");

    let get = app
        .client
        .get(app.url(&format!("/api/sessions/{session_id}")))
        .send()
        .await
        .expect("get request");
    assert_eq!(get.status(), reqwest::StatusCode::OK);

    let list = app
        .client
        .get(app.url("/api/sessions"))
        .send()
        .await
        .expect("list request");
    let listed: serde_json::Value = list.json().await.expect("json body");
    let sessions = listed["sessions"].as_array().expect("sessions array");
    assert!(sessions.iter().any(|s| s["id"] == session_id));

    let archive = app
        .client
        .post(app.url(&format!("/api/sessions/{session_id}/archive")))
        .send()
        .await
        .expect("archive request");
    assert_eq!(archive.status(), reqwest::StatusCode::OK);
    let archived: serde_json::Value = archive.json().await.expect("json body");
    assert_eq!(archived["status"], "archived");
}

#[tokio::test]
async fn continuing_an_archived_session_is_rejected() {
    let app = TestApp::spawn().await;

    let create = app
        .client
        .post(app.url("/api/sessions"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("create request");
    let created: serde_json::Value = create.json().await.expect("json body");
    let session_id = created["id"].as_str().expect("id string").to_owned();

    app.client
        .post(app.url(&format!("/api/sessions/{session_id}/archive")))
        .send()
        .await
        .expect("archive request");

    let response = app
        .client
        .post(app.url(&format!("/api/sessions/{session_id}/continue")))
        .json(&serde_json::json!({"prompt": "keep going"}))
        .send()
        .await
        .expect("continue request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn continue_active_session_accrues_cost() {
    let app = TestApp::spawn().await;

    let create = app
        .client
        .post(app.url("/api/sessions"))
        .json(&serde_json::json!({}))
        .send()
        .await
        .expect("create request");
    let created: serde_json::Value = create.json().await.expect("json body");
    let session_id = created["id"].as_str().expect("id string").to_owned();

    let response = app
        .client
        .post(app.url(&format!("/api/sessions/{session_id}/continue")))
        .json(&serde_json::json!({"prompt": "keep going"}))
        .send()
        .await
        .expect("continue request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["success"], true);

    let session = app
        .state
        .session_manager
        .get(&session_id)
        .await
        .expect("session persisted");
    assert!(session.total_cost_usd > 0.0);
    assert_eq!(session.messages_count, 1);
}

#[tokio::test]
async fn search_sessions_matches_metadata_substring() {
    let app = TestApp::spawn().await;

    app.client
        .post(app.url("/api/sessions"))
        .json(&serde_json::json!({"metadata": {"label": "needle-project"}}))
        .send()
        .await
        .expect("create request");

    let response = app
        .client
        .get(app.url("/api/sessions/search?q=needle"))
        .send()
        .await
        .expect("search request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("json body");
    let sessions = body["sessions"].as_array().expect("sessions array");
    assert!(!sessions.is_empty());
}

#[tokio::test]
async fn delete_unknown_session_is_404() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .delete(app.url("/api/sessions/does-not-exist"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_and_global_stats_endpoints_respond() {
    let app = TestApp::spawn().await;

    let session_stats = app
        .client
        .get(app.url("/api/sessions/stats"))
        .send()
        .await
        .expect("session stats request");
    assert_eq!(session_stats.status(), reqwest::StatusCode::OK);

    app.client
        .post(app.url("/api/claude"))
        .json(&serde_json::json!({"prompt": "for stats"}))
        .send()
        .await
        .expect("execute request");

    let stats = app
        .client
        .get(app.url("/api/stats"))
        .send()
        .await
        .expect("stats request");
    assert_eq!(stats.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = stats.json().await.expect("json body");
    assert!(body["aggregate"].is_object());
    assert!(body["daily"].is_array());
}
