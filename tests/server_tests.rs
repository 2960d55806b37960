//! # HTTP Server Tests
//!
//! Drives the axum application in-process with `tower::ServiceExt::oneshot`
//! over a temporary site directory.

use axum::body::{to_bytes, Body};
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use hotpage::bootstrap::Bootstrap;
use hotpage::hub::Hub;
use hotpage::signal::ReloadSignal;
use hotpage::web::{app, with_reloader, AppState};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::{sleep, timeout, Duration};
use tower::ServiceExt;

const PUSH_URL: &str = "http://localhost:3000/sse";
const TAG: &str = r#"<script type="module" src="http://localhost:3000/sse/init.js"></script>"#;

fn site() -> (TempDir, Router, Arc<Hub>) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(
        temp_dir.path().join("index.html"),
        "<!doctype html><html><head><title>t</title></head><body>hello</body></html>",
    )
    .unwrap();
    std::fs::write(temp_dir.path().join("bare.html"), "<p>no head</p>").unwrap();
    std::fs::write(temp_dir.path().join("site.css"), "body { color: red; }").unwrap();

    let hub = Arc::new(Hub::new());
    let bootstrap = Bootstrap::new(PUSH_URL).expect("valid push URL");
    let router = app(temp_dir.path(), AppState::new(Arc::clone(&hub), bootstrap));
    (temp_dir, router, hub)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn html_pages_get_the_bootstrap_tag() {
    let (_dir, router, _hub) = site();
    let response = router.oneshot(get("/index.html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let declared_length: usize = response.headers()[CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let body = body_string(response).await;
    assert_eq!(
        body,
        format!(
            "<!doctype html><html><head>{}<title>t</title></head><body>hello</body></html>",
            TAG
        )
    );
    assert_eq!(declared_length, body.len());
}

#[tokio::test]
async fn directory_index_is_injected_too() {
    let (_dir, router, _hub) = site();
    let response = router.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await.matches(TAG).count(), 1);
}

#[tokio::test]
async fn headless_html_is_served_unchanged() {
    let (_dir, router, _hub) = site();
    let response = router.oneshot(get("/bare.html")).await.unwrap();
    assert_eq!(body_string(response).await, "<p>no head</p>");
}

#[tokio::test]
async fn head_reports_the_injected_length() {
    let (_dir, router, _hub) = site();
    let full = router.clone().oneshot(get("/index.html")).await.unwrap();
    let head = Request::builder()
        .method(Method::HEAD)
        .uri("/index.html")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(head).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_LENGTH], full.headers()[CONTENT_LENGTH]);
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn non_utf8_page_fails_without_stopping_the_server() {
    let files = Router::new()
        .route(
            "/latin1.html",
            axum::routing::get(|| async {
                (
                    [(CONTENT_TYPE, "text/html; charset=iso-8859-1")],
                    b"<html><head><title>caf\xe9</title></head></html>".to_vec(),
                )
            }),
        )
        .route(
            "/index.html",
            axum::routing::get(|| async {
                (
                    [(CONTENT_TYPE, "text/html; charset=utf-8")],
                    "<html><head></head></html>",
                )
            }),
        );
    let state = AppState::new(
        Arc::new(Hub::new()),
        Bootstrap::new(PUSH_URL).expect("valid push URL"),
    );
    let router = with_reloader(files, state);

    let response = router.clone().oneshot(get("/latin1.html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = router.oneshot(get("/index.html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_string(response).await,
        format!("<html><head>{}</head></html>", TAG)
    );
}

#[tokio::test]
async fn stylesheets_pass_through_untouched() {
    let (_dir, router, _hub) = site();
    let response = router.oneshot(get("/site.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/css"));
    assert_eq!(body_string(response).await, "body { color: red; }");
}

#[tokio::test]
async fn missing_files_are_not_intercepted() {
    let (_dir, router, _hub) = site();
    let response = router.oneshot(get("/nope.html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bootstrap_script_is_served_with_exact_length() {
    let (_dir, router, _hub) = site();
    let response = router.oneshot(get("/sse/init.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/javascript");
    let declared = response.headers()[CONTENT_LENGTH].clone();

    let script = body_string(response).await;
    assert_eq!(declared, script.len().to_string().as_str());
    assert!(script.contains(r#"new EventSource("http://localhost:3000/sse")"#));
    assert!(script.contains(r#"const FULL_RELOAD = "0";"#));
    assert!(script.contains(r#"const STYLE_RELOAD = "1";"#));
    assert!(!script.contains("__"), "all placeholders replaced");
}

#[tokio::test]
async fn push_endpoint_delivers_one_signal_then_closes() {
    let (_dir, router, hub) = site();
    let pending = tokio::spawn(router.oneshot(get("/sse")));

    for _ in 0..100 {
        if hub.len() == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.len(), 1, "push connection should be registered");
    assert_eq!(hub.broadcast(ReloadSignal::Style), 1);
    assert!(hub.is_empty());

    let response = timeout(Duration::from_secs(5), pending)
        .await
        .expect("push response should complete")
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()[CONTENT_LENGTH], "20");
    assert_eq!(body_string(response).await, "retry: 100\ndata: 1\n\n");
}

#[tokio::test]
async fn released_push_connection_gets_no_content() {
    let (_dir, router, hub) = site();
    let pending = tokio::spawn(router.oneshot(get("/sse")));
    while hub.is_empty() {
        sleep(Duration::from_millis(10)).await;
    }
    hub.disconnect_all();

    let response = timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[test]
fn push_url_is_escaped_exactly_once() {
    let raw = Bootstrap::new("http://localhost:3000/live sse").unwrap();
    let escaped = Bootstrap::new("http://localhost:3000/live%20sse").unwrap();
    assert_eq!(raw.push_url(), "http://localhost:3000/live%20sse");
    assert_eq!(escaped.push_url(), raw.push_url());
    assert_eq!(
        raw.script_tag(),
        r#"<script type="module" src="http://localhost:3000/live%20sse/init.js"></script>"#
    );

    let quoted = Bootstrap::new("http://x/\"><b>").unwrap();
    assert!(!quoted.script_tag().contains("\"><b>"));

    assert!(Bootstrap::new("http://x/%FF").is_err());

    let reserved = Bootstrap::new("http://x/a%3Fb%2f%41 c/sse").unwrap();
    assert_eq!(reserved.push_url(), "http://x/a%3Fb%2fA%20c/sse");
}
