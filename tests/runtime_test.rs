//! Integration tests for the runtime bridge endpoint.

mod common;

use common::TestHarness;
use scormcast::runtime::{CompletionStatus, RuntimeShim};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

async fn call(harness: &TestHarness, generation: &str, method: &str, args: &[&str]) -> (u16, String) {
    let resp = reqwest::Client::new()
        .post(format!(
            "{}/runtime/{}/{}",
            harness.base_url(),
            generation,
            method
        ))
        .json(&json!({ "args": args }))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.text().await.unwrap())
}

#[tokio::test]
async fn calls_without_installed_runtime_are_gone() {
    let harness = TestHarness::start().await;

    let (status, _) = call(&harness, "12", "LMSInitialize", &[""]).await;
    assert_eq!(status, 410);
}

#[tokio::test]
async fn unknown_method_or_generation_is_rejected() {
    let harness = TestHarness::start().await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let _guard = harness.ctx.shims.install(Arc::new(RuntimeShim::new(0, tx)));

    let (status, body) = call(&harness, "12", "Initialize", &[""]).await;
    assert_eq!(status, 400);
    assert!(body.contains("Initialize"));

    let (status, _) = call(&harness, "3", "LMSInitialize", &[""]).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn scorm12_session_reports_completion_once() {
    let harness = TestHarness::start().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let shim = Arc::new(RuntimeShim::new(3, tx));
    let _guard = harness.ctx.shims.install(Arc::clone(&shim));

    assert_eq!(call(&harness, "12", "LMSInitialize", &[""]).await, (200, "true".to_string()));
    assert_eq!(
        call(&harness, "12", "LMSGetValue", &["cmi.core.student_name"]).await,
        (200, String::new())
    );
    assert_eq!(
        call(&harness, "12", "LMSSetValue", &["cmi.core.lesson_location", "page-4"]).await,
        (200, "true".to_string())
    );
    assert!(rx.try_recv().is_err());

    assert_eq!(
        call(&harness, "12", "LMSSetValue", &["cmi.core.lesson_status", "passed"]).await,
        (200, "true".to_string())
    );
    assert_eq!(call(&harness, "12", "LMSGetLastError", &[]).await, (200, "0".to_string()));
    assert_eq!(call(&harness, "12", "LMSFinish", &[""]).await, (200, "true".to_string()));

    let signal = rx.try_recv().unwrap();
    assert_eq!(signal.item_index, 3);
    assert_eq!(signal.status, CompletionStatus::Passed);
    assert!(rx.try_recv().is_err());

    let writes = shim.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].element, "cmi.core.lesson_location");
    assert_eq!(writes[0].value, "page-4");
}

#[tokio::test]
async fn scorm2004_completion_status() {
    let harness = TestHarness::start().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _guard = harness.ctx.shims.install(Arc::new(RuntimeShim::new(0, tx)));

    call(&harness, "2004", "Initialize", &[""]).await;
    call(&harness, "2004", "SetValue", &["cmi.completion_status", "incomplete"]).await;
    assert!(rx.try_recv().is_err());

    let (status, body) =
        call(&harness, "2004", "SetValue", &["cmi.completion_status", "completed"]).await;
    assert_eq!((status, body.as_str()), (200, "true"));
    assert_eq!(rx.try_recv().unwrap().status, CompletionStatus::Completed);
}

#[tokio::test]
async fn dropping_the_guard_uninstalls_the_runtime() {
    let harness = TestHarness::start().await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let guard = harness.ctx.shims.install(Arc::new(RuntimeShim::new(0, tx)));

    assert_eq!(call(&harness, "12", "LMSCommit", &[""]).await.0, 200);
    drop(guard);
    assert_eq!(call(&harness, "12", "LMSCommit", &[""]).await.0, 410);
}

#[tokio::test]
async fn bridge_script_is_served() {
    let harness = TestHarness::start().await;

    let resp = reqwest::get(format!("{}/player/runtime-bridge.js", harness.base_url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/javascript"));
    let body = resp.text().await.unwrap();
    assert!(body.contains("API_1484_11"));
    assert!(body.contains("/runtime/"));
}

#[tokio::test]
async fn router_answers_runtime_call_without_body() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use scormcast::server::create_router;
    use tower::ServiceExt;

    let harness = TestHarness::start().await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let _guard = harness.ctx.shims.install(Arc::new(RuntimeShim::new(0, tx)));

    let response = create_router(harness.ctx.clone())
        .oneshot(
            Request::post("/runtime/2004/GetLastError")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"0");
}
