// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-board commands and the status-line endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::board::BoardCommand;
use crate::error::ErrorCode;
use crate::transport::state::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct TasksBody {
    #[serde(default)]
    pub command: String,
    /// Shell name recorded by `claim`.
    pub caller: Option<String>,
}

/// `POST /api/v1/tasks` — run one board command.
pub async fn tasks(
    State(s): State<Arc<Store>>,
    Json(body): Json<TasksBody>,
) -> impl IntoResponse {
    let command = match BoardCommand::parse(&body.command) {
        Ok(command) => command,
        Err(hint) => return ErrorCode::BadRequest.to_http_response(hint).into_response(),
    };
    let caller = body.caller.unwrap_or_else(|| "anonymous".to_owned());
    match s.board.execute(command, &caller).await {
        Ok(reply) => {
            // Keep the shared status line in step with the board.
            s.status.update("tasks", &s.board.summary().await).await;
            Json(reply).into_response()
        }
        Err(message) => ErrorCode::BadRequest.to_http_response(message).into_response(),
    }
}

/// `GET /api/v1/status`
pub async fn get_status(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(json!({ "line": s.status.status_line().await }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusBody {
    pub tool: String,
    #[serde(default)]
    pub value: String,
}

/// `POST /api/v1/status` — set or clear one tool's status item.
pub async fn post_status(
    State(s): State<Arc<Store>>,
    Json(body): Json<StatusBody>,
) -> impl IntoResponse {
    if body.tool.is_empty() {
        return ErrorCode::BadRequest
            .to_http_response("expected: {tool, value}")
            .into_response();
    }
    s.status.update(&body.tool, &body.value).await;
    Json(json!({ "line": s.status.status_line().await })).into_response()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushBody {
    pub tool: String,
    pub text: String,
}

/// `POST /api/v1/push` — queue and broadcast a one-shot notice.
pub async fn push_notice(
    State(s): State<Arc<Store>>,
    Json(body): Json<PushBody>,
) -> impl IntoResponse {
    s.status.push(&body.tool, &body.text).await;
    Json(json!({ "pushed": true }))
}
