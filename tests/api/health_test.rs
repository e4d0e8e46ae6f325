use crate::support::TestApp;

#[tokio::test]
async fn healthz_reports_ok() {
    let app = TestApp::spawn().await;

    let response = app.client.get(app.url("/healthz")).send().await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_s"].is_u64());
}
