// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent session HTTP handlers: prompt, interrupt, kill, transcripts.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::ErrorCode;
use crate::supervisor::{InterruptOutcome, SupervisorError};
use crate::transcript;
use crate::transport::state::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct SendToAgentBody {
    pub name: String,
    pub text: String,
    pub from: Option<String>,
}

/// `POST /api/v1/agent/send` — paste into the named agent's input, or
/// queue it when the agent has no running child.
pub async fn send_to_agent(
    State(s): State<Arc<Store>>,
    Json(body): Json<SendToAgentBody>,
) -> impl IntoResponse {
    let Some(session) = s.agents.find_by_name(&body.name).await else {
        return ErrorCode::NotFound
            .to_http_response(format!("no agent named {:?}", body.name))
            .into_response();
    };
    let from = body.from.unwrap_or_else(|| "anonymous".to_owned());
    let delivered = s.agents.deliver_or_queue(&session.id, &from, &body.text).await;
    Json(json!({ "delivered": delivered, "sessionId": session.id })).into_response()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptBody {
    pub session_id: Option<String>,
    #[serde(default)]
    pub prompt: String,
    pub cwd: Option<String>,
}

/// `POST /api/v1/agent/prompt` — dispatch a prompt, creating a session
/// on first use.
pub async fn agent_prompt(
    State(s): State<Arc<Store>>,
    Json(body): Json<PromptBody>,
) -> impl IntoResponse {
    if body.prompt.is_empty() {
        return ErrorCode::BadRequest
            .to_http_response("expected: {session_id?, prompt, cwd?}")
            .into_response();
    }
    let session = match &body.session_id {
        Some(id) => match s.agents.get(id).await {
            Some(session) => session,
            None => {
                return ErrorCode::NotFound
                    .to_http_response("no such agent session")
                    .into_response()
            }
        },
        None => {
            let cwd = body
                .cwd
                .clone()
                .map(PathBuf::from)
                .unwrap_or_else(|| s.settings.project_dir.clone());
            s.agents.register(cwd).await
        }
    };
    match s.agents.prompt(&session.id, &body.prompt).await {
        Ok(()) => Json(json!({
            "sessionId": session.id,
            "name": session.name().await,
            "status": session.status().await,
        }))
        .into_response(),
        Err(SupervisorError::NotFound) => {
            ErrorCode::NotFound.to_http_response("no such agent session").into_response()
        }
        Err(SupervisorError::SpawnFailed(detail)) => {
            ErrorCode::Internal.to_http_response(detail).into_response()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptBody {
    pub session_id: String,
    pub message: String,
    pub from: Option<String>,
}

/// `POST /api/v1/agent/interrupt`
pub async fn agent_interrupt(
    State(s): State<Arc<Store>>,
    Json(body): Json<InterruptBody>,
) -> impl IntoResponse {
    let from = body.from.unwrap_or_else(|| "anonymous".to_owned());
    let outcome = s.agents.interrupt_and_queue(&body.session_id, &from, &body.message).await;
    match outcome {
        InterruptOutcome::NotFound => {
            ErrorCode::NotFound.to_http_response("no such agent session").into_response()
        }
        outcome => Json(json!({ "result": outcome })).into_response(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KillBody {
    pub session_id: String,
}

/// `POST /api/v1/agent/kill`
pub async fn agent_kill(
    State(s): State<Arc<Store>>,
    Json(body): Json<KillBody>,
) -> impl IntoResponse {
    if s.agents.kill(&body.session_id).await {
        Json(json!({ "killed": true })).into_response()
    } else {
        ErrorCode::NotFound.to_http_response("no such agent session").into_response()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptQuery {
    pub session: String,
}

/// `GET /api/v1/agent/transcript?session=<id>`
pub async fn agent_transcript(
    State(s): State<Arc<Store>>,
    Query(query): Query<TranscriptQuery>,
) -> impl IntoResponse {
    let Some(session) = s.agents.get(&query.session).await else {
        return ErrorCode::NotFound
            .to_http_response("no such agent session")
            .into_response();
    };
    Json(json!({
        "sessionId": session.id,
        "name": session.name().await,
        "status": session.status().await,
        "transcript": session.transcript().await,
    }))
    .into_response()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptsQuery {
    pub cwd: Option<String>,
}

/// `GET /api/v1/transcripts` — saved transcripts, newest first.
pub async fn list_transcripts(
    State(s): State<Arc<Store>>,
    Query(query): Query<TranscriptsQuery>,
) -> impl IntoResponse {
    let cwd = query.cwd.map(PathBuf::from).unwrap_or_else(|| s.settings.project_dir.clone());
    Json(json!({ "transcripts": transcript::list(&cwd).await }))
}

/// `GET /api/v1/transcripts/{file}`
pub async fn load_transcript(
    State(s): State<Arc<Store>>,
    Path(file): Path<String>,
    Query(query): Query<TranscriptsQuery>,
) -> impl IntoResponse {
    let cwd = query.cwd.map(PathBuf::from).unwrap_or_else(|| s.settings.project_dir.clone());
    match transcript::load(&cwd, &file).await {
        Some(envelope) => Json(envelope).into_response(),
        None => ErrorCode::NotFound.to_http_response("no such transcript").into_response(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestoreBody {
    pub file: String,
    pub cwd: Option<String>,
}

/// `POST /api/v1/transcripts/restore` — fresh session from a saved file.
pub async fn restore_transcript(
    State(s): State<Arc<Store>>,
    Json(body): Json<RestoreBody>,
) -> impl IntoResponse {
    let cwd = body.cwd.map(PathBuf::from).unwrap_or_else(|| s.settings.project_dir.clone());
    match s.agents.restore(&cwd, &body.file).await {
        Ok(session) => Json(json!({
            "sessionId": session.id,
            "name": session.name().await,
            "restored": true,
        }))
        .into_response(),
        Err(_) => ErrorCode::NotFound.to_http_response("no such transcript").into_response(),
    }
}
