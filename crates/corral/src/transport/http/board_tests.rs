// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;

use crate::test_support::{AnyhowExt, StoreBuilder};
use crate::transport::build_router;

#[tokio::test]
async fn tasks_add_then_detail() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = StoreBuilder::new().project_dir(dir.path()).build();
    let server = axum_test::TestServer::new(build_router(store)).anyhow()?;

    let resp = server
        .post("/api/v1/tasks")
        .json(&serde_json::json!({"command": "add \"fix nav\" queued", "caller": "amber"}))
        .await;
    resp.assert_status(StatusCode::OK);
    let added: serde_json::Value = resp.json();
    assert_eq!(added["title"], "fix nav");
    assert_eq!(added["column"], "queued");

    let detail: serde_json::Value = server
        .post("/api/v1/tasks")
        .json(&serde_json::json!({"command": "detail 1"}))
        .await
        .json();
    assert_eq!(detail["title"], "fix nav");
    Ok(())
}

#[tokio::test]
async fn tasks_mutation_refreshes_status_line() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = StoreBuilder::new().project_dir(dir.path()).build();
    let server = axum_test::TestServer::new(build_router(store)).anyhow()?;

    server
        .post("/api/v1/tasks")
        .json(&serde_json::json!({"command": "add \"one\""}))
        .await;

    let status: serde_json::Value = server.get("/api/v1/status").await.json();
    let line = status["line"].as_str().unwrap_or_default();
    assert!(line.contains("1 queued"), "line: {line}");
    Ok(())
}

#[tokio::test]
async fn tasks_bad_command_is_400_with_hint() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = StoreBuilder::new().project_dir(dir.path()).build();
    let server = axum_test::TestServer::new(build_router(store)).anyhow()?;

    let resp = server
        .post("/api/v1/tasks")
        .json(&serde_json::json!({"command": "block 1"}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body = resp.text();
    assert!(body.contains("block <id>"), "hint: {body}");
    Ok(())
}

#[tokio::test]
async fn tasks_unknown_id_is_400() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = StoreBuilder::new().project_dir(dir.path()).build();
    let server = axum_test::TestServer::new(build_router(store)).anyhow()?;

    let resp = server
        .post("/api/v1/tasks")
        .json(&serde_json::json!({"command": "done 42"}))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body = resp.text();
    assert!(body.contains("no task with id 42"), "body: {body}");
    Ok(())
}

#[tokio::test]
async fn status_endpoints_set_and_render() -> anyhow::Result<()> {
    let store = StoreBuilder::new().build();
    let server = axum_test::TestServer::new(build_router(store)).anyhow()?;

    let resp = server
        .post("/api/v1/status")
        .json(&serde_json::json!({"tool": "recorder", "value": "3 clips"}))
        .await;
    resp.assert_status(StatusCode::OK);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["line"], "recorder: 3 clips");

    let resp =
        server.post("/api/v1/status").json(&serde_json::json!({"tool": "", "value": "x"})).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn push_notice_accepted() -> anyhow::Result<()> {
    let store = StoreBuilder::new().build();
    let server = axum_test::TestServer::new(build_router(store.clone())).anyhow()?;

    let resp = server
        .post("/api/v1/push")
        .json(&serde_json::json!({"tool": "tests", "text": "suite green"}))
        .await;
    resp.assert_status(StatusCode::OK);

    let notices = store.status.take_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].text, "suite green");
    Ok(())
}
