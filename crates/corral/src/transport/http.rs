// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP request/response types and axum handler implementations.

mod agent;
mod board;
mod call;
mod shell;

pub use agent::*;
pub use board::*;
pub use call::*;
pub use shell::*;

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::hub::PeerRole;
use crate::transport::state::Store;

/// Header carrying the opaque agent-session token used for affinity.
pub const SESSION_HEADER: &str = "x-corral-session";

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": s.settings.started_at.elapsed().as_secs(),
        "serverSessionId": s.hub.server_session_id,
        "windows": s.hub.windows.len().await,
        "pages": s.hub.peers.count(PeerRole::Page),
        "observers": s.hub.peers.count(PeerRole::AgentObserver),
        "terminals": s.hub.peers.count(PeerRole::Terminal),
        "inFlight": s.hub.pending.in_flight().await,
    }))
}




#[cfg(test)]
mod board_tests;
