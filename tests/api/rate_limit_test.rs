use crate::support::{StubExecutor, TestApp};

#[tokio::test]
async fn requests_beyond_the_window_limit_are_rejected() {
    let app = TestApp::spawn_with(StubExecutor::always_success(), |config| {
        config.rate_limit.window_ms = 60_000;
        config.rate_limit.max_requests = 2;
    })
    .await;

    let first = app.client.get(app.url("/healthz")).send().await.expect("request 1");
    let second = app.client.get(app.url("/healthz")).send().await.expect("request 2");
    let third = app.client.get(app.url("/healthz")).send().await.expect("request 3");

    assert_eq!(first.status(), reqwest::StatusCode::OK);
    assert_eq!(second.status(), reqwest::StatusCode::OK);
    assert_eq!(third.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn disabled_rate_limiting_never_rejects() {
    let app = TestApp::spawn_with(StubExecutor::always_success(), |config| {
        config.rate_limit.enabled = false;
    })
    .await;

    for _ in 0..10 {
        let response = app.client.get(app.url("/healthz")).send().await.expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
    }
}
