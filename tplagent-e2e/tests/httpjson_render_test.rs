//! Renders a template whose data comes from the httpjson action, against a
//! local mock upstream.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tplagent_agent::process::RenderProcess;
use tplagent_agent::supervisor::Generation;
use tplagent_e2e::harness::{agent_spec, TemplateSpecBuilder};

async fn spawn_mock_upstream() -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route(
            "/s",
            get(|| async { Json(serde_json::json!({"Port": 5005, "LogLevel": "ERROR"})) }),
        )
        .route(
            "/list",
            get(|| async { Json(serde_json::json!(["a", "b", "c"])) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), server)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_httpjson_map_render() {
    let (base_url, server) = spawn_mock_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("svc.json");

    let template = concat!(
        r#"{% set s = httpjson_GET_Map("/s") %}"#,
        r#"{"port":{{ s.Port }},"log_level":"{{ s.LogLevel }}"}"#,
    );
    let spec = TemplateSpecBuilder::raw(template, &dest)
        .action("httpjson", serde_json::json!({"base_url": base_url, "timeout": "5s"}))
        .render_once()
        .build();

    let mut templates = BTreeMap::new();
    templates.insert("svc".to_string(), spec);

    let process = RenderProcess::new(&agent_spec(10));
    let generation = Generation::child_of(&CancellationToken::new());
    process.start(generation, templates).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(&dest).unwrap(),
        r#"{"port":5005,"log_level":"ERROR"}"#
    );
    server.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_httpjson_slice_render() {
    let (base_url, server) = spawn_mock_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("list.txt");

    let template = r#"{{ httpjson_GET_Slice("/list") | join(",") }}"#;
    let spec = TemplateSpecBuilder::raw(template, &dest)
        .action("httpjson", serde_json::json!({"base_url": base_url}))
        .render_once()
        .build();

    let mut templates = BTreeMap::new();
    templates.insert("list".to_string(), spec);

    let process = RenderProcess::new(&agent_spec(10));
    let generation = Generation::child_of(&CancellationToken::new());
    process.start(generation, templates).await.unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "a,b,c");
    server.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_httpjson_error_status_fails_render() {
    let (base_url, server) = spawn_mock_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("err.txt");

    // /missing returns 404, which the action is configured to treat as an error
    let template = r#"{{ httpjson_GET_Map("/missing") }}"#;
    let spec = TemplateSpecBuilder::raw(template, &dest)
        .action(
            "httpjson",
            serde_json::json!({"base_url": base_url, "error_statuses": [404]}),
        )
        .render_once()
        .build();

    let mut templates = BTreeMap::new();
    templates.insert("err".to_string(), spec);

    // render-once logs the failure and exits cleanly; the destination must
    // never have been written
    let process = RenderProcess::new(&agent_spec(10));
    let generation = Generation::child_of(&CancellationToken::new());
    process.start(generation, templates).await.unwrap();

    assert!(!dest.exists());
    server.abort();
}
