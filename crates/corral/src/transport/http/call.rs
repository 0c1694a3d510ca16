// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The generic routed-command endpoint and window management.
//!
//! Every browser-facing operation goes through `POST /api/v1/call`; the
//! reply is whatever the page sent back, or an in-band
//! `{success:false, error}` when routing failed.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ErrorCode;
use crate::hub::CallRequest;
use crate::transport::state::Store;

use super::SESSION_HEADER;

#[derive(Debug, Clone, Deserialize)]
pub struct CallBody {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    pub window: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallQuery {
    pub window: Option<String>,
}

/// `POST /api/v1/call` — route one command to one page.
///
/// Target priority: `?window=` query > body `window` > session-header
/// affinity > focused > most recent.
pub async fn call(
    State(s): State<Arc<Store>>,
    Query(query): Query<CallQuery>,
    headers: HeaderMap,
    Json(body): Json<CallBody>,
) -> impl IntoResponse {
    if body.channel.is_empty() || body.action.is_empty() {
        return ErrorCode::BadRequest
            .to_http_response(
                "expected: {channel, action, payload?, window?, timeout_ms?}",
            )
            .into_response();
    }
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let timeout = body
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(s.settings.default_call_timeout);

    let reply = s
        .hub
        .call(CallRequest {
            channel: body.channel,
            action: body.action,
            payload: body.payload,
            timeout,
            window: query.window.or(body.window),
            session,
        })
        .await;
    Json(reply).into_response()
}

/// `GET /api/v1/windows`
pub async fn list_windows(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "windows": s.hub.windows.list().await,
        "focusedWindowId": s.hub.windows.focused().await,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct FocusBody {
    /// `null` clears focus so recency decides routing.
    pub window: Option<String>,
}

/// `POST /api/v1/focus`
pub async fn focus(
    State(s): State<Arc<Store>>,
    Json(body): Json<FocusBody>,
) -> impl IntoResponse {
    if !s.hub.windows.set_focused(body.window.as_deref()).await {
        let window = body.window.unwrap_or_default();
        return ErrorCode::NotFound
            .to_http_response(format!("Window {window} not found"))
            .into_response();
    }
    s.refresh_browser_status().await;
    Json(serde_json::json!({ "focusedWindowId": s.hub.windows.focused().await }))
        .into_response()
}
