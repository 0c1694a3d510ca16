// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API contract types and server implementation for the HTTP and
//! WebSocket transports.

pub mod http;
pub mod state;
pub mod ws;

pub use state::Store;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the axum `Router` with all HTTP routes and the three WebSocket
/// mount points.
pub fn build_router(state: Arc<Store>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/call", post(http::call))
        .route("/api/v1/windows", get(http::list_windows))
        .route("/api/v1/focus", post(http::focus))
        .route("/api/v1/shell/register", post(http::register_shell))
        .route("/api/v1/shell/rename", post(http::rename_shell))
        .route("/api/v1/shells", get(http::list_shells))
        .route("/api/v1/shell/dm", post(http::send_dm))
        .route("/api/v1/agent/send", post(http::send_to_agent))
        .route("/api/v1/agent/prompt", post(http::agent_prompt))
        .route("/api/v1/agent/interrupt", post(http::agent_interrupt))
        .route("/api/v1/agent/kill", post(http::agent_kill))
        .route("/api/v1/agent/transcript", get(http::agent_transcript))
        .route("/api/v1/transcripts", get(http::list_transcripts))
        .route("/api/v1/transcripts/restore", post(http::restore_transcript))
        .route("/api/v1/transcripts/{file}", get(http::load_transcript))
        .route("/api/v1/tasks", post(http::tasks))
        .route("/api/v1/status", get(http::get_status).post(http::post_status))
        .route("/api/v1/push", post(http::push_notice))
        .route("/ws/page", get(ws::page_handler))
        .route("/ws/agent", get(ws::agent_handler))
        .route("/ws/terminal", get(ws::terminal_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
