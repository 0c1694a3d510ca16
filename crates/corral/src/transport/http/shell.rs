// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal shell identity: register, rename, list, direct messages.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::ErrorCode;
use crate::frame::Frame;
use crate::transport::state::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterShellBody {
    pub cwd: Option<String>,
}

/// `POST /api/v1/shell/register` — create a shell identity (which is
/// also an agent session) and return it with the current status line.
pub async fn register_shell(
    State(s): State<Arc<Store>>,
    Json(body): Json<RegisterShellBody>,
) -> impl IntoResponse {
    let cwd = body
        .cwd
        .map(PathBuf::from)
        .unwrap_or_else(|| s.settings.project_dir.clone());
    let session = s.agents.register(cwd).await;
    Json(json!({
        "shellId": session.id,
        "name": session.name().await,
        "status": s.status.status_line().await,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameShellBody {
    pub shell_id: String,
    pub name: String,
}

/// `POST /api/v1/shell/rename`
pub async fn rename_shell(
    State(s): State<Arc<Store>>,
    Json(body): Json<RenameShellBody>,
) -> impl IntoResponse {
    if body.name.is_empty() {
        return ErrorCode::BadRequest
            .to_http_response("expected: {shell_id, name}")
            .into_response();
    }
    if s.agents.rename(&body.shell_id, &body.name).await {
        Json(json!({ "renamed": true, "name": body.name })).into_response()
    } else {
        ErrorCode::NotFound.to_http_response("no such shell").into_response()
    }
}

/// `GET /api/v1/shells`
pub async fn list_shells(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(json!({ "shells": s.agents.list().await }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct DmBody {
    /// Target shell, `@name` or bare name.
    pub to: String,
    pub text: String,
    pub from: Option<String>,
}

/// `POST /api/v1/shell/dm` — deliver a direct message to the named
/// terminal peer.
pub async fn send_dm(
    State(s): State<Arc<Store>>,
    Json(body): Json<DmBody>,
) -> impl IntoResponse {
    let name = body.to.strip_prefix('@').unwrap_or(&body.to);
    let Some(session) = s.agents.find_by_name(name).await else {
        return ErrorCode::NotFound
            .to_http_response(format!("no shell named {name:?}"))
            .into_response();
    };
    let Some(terminal) = s.hub.peers.terminal_for_shell(&session.id) else {
        return ErrorCode::NotFound
            .to_http_response(format!("shell {name:?} has no connected terminal"))
            .into_response();
    };
    let frame = Frame::system(
        "dm",
        json!({
            "from": body.from.unwrap_or_else(|| "anonymous".to_owned()),
            "text": body.text,
        }),
    );
    let delivered = terminal.send(&frame.to_text());
    Json(json!({ "delivered": delivered })).into_response()
}
