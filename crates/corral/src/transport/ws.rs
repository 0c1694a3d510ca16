// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three WebSocket mount points: `/ws/page`, `/ws/agent`,
//! `/ws/terminal`.
//!
//! Every connection gets a reader loop plus an mpsc-fed writer, so a
//! slow or dead peer can never stall another connection. Malformed
//! frames are logged and dropped; the peer stays connected.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::frame::{Frame, Incoming, SystemFrame};
use crate::hub::{ClaimOutcome, PeerHandle, PeerRole, WindowClaim};
use crate::transport::state::Store;

type WsTx = SplitSink<WebSocket, Message>;

async fn send_text(tx: &mut WsTx, text: String) -> Result<(), ()> {
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

// -- Pages --------------------------------------------------------------------

pub async fn page_handler(
    State(state): State<Arc<Store>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| page_connection(state, socket))
}

async fn page_connection(state: Arc<Store>, socket: WebSocket) {
    let (peer, mut out_rx) = state.hub.peers.add(PeerRole::Page, None);
    let closed = peer.closed();
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            outbound = out_rx.recv() => {
                let Some(text) = outbound else { break };
                if send_text(&mut ws_tx, text).await.is_err() {
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_page_text(&state, &peer, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let dropped = state.hub.drop_page_peer(&peer.id).await;
    if let Some(window_id) = dropped {
        debug!(window = %window_id, "page disconnected");
        state.refresh_browser_status().await;
        broadcast_window_state(&state, None).await;
    }
}

async fn handle_page_text(state: &Arc<Store>, peer: &Arc<PeerHandle>, text: &str) {
    state.hub.peers.touch(&peer.id);
    state.hub.windows.touch_peer(&peer.id).await;

    let incoming = match Incoming::parse(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            warn!(peer = %peer.id, "dropping malformed page frame: {e}");
            return;
        }
    };
    match incoming {
        Incoming::Reply(reply) => state.hub.deliver_reply(reply).await,
        Incoming::Frame(frame) if frame.is_system() => {
            handle_page_system(state, peer, &frame).await;
            state.hub.echo_to_other_pages(&peer.id, &frame).await;
        }
        Incoming::Frame(frame) => state.hub.bus.publish(&frame).await,
    }
}

async fn handle_page_system(state: &Arc<Store>, peer: &Arc<PeerHandle>, frame: &Frame) {
    match SystemFrame::from_frame(frame) {
        Some(SystemFrame::Identity(identity)) => {
            let outcome = state.hub.windows.claim(WindowClaim::from(&identity), &peer.id).await;
            if let ClaimOutcome::Evicted { prior_peer } = &outcome {
                // One owner per window id: the displaced connection goes.
                if let Some(prior) = state.hub.peers.get(prior_peer) {
                    prior.close();
                }
            }
            if let Some(reported) = &identity.server_session_id {
                if *reported != state.hub.server_session_id {
                    // The page bootstrapped against an older server run;
                    // nudge it to pull fresh client code.
                    peer.send(
                        &Frame::system(
                            "reload",
                            json!({ "serverSessionId": state.hub.server_session_id }),
                        )
                        .to_text(),
                    );
                }
            }
            debug!(window = %identity.window_id, peer = %peer.id, ?outcome, "window claimed");
            state.refresh_browser_status().await;
            broadcast_window_state(state, Some(peer.id.as_str())).await;
        }
        Some(SystemFrame::WindowUpdated { url, title, active, label }) => {
            state.hub.windows.update_by_peer(&peer.id, url, title, active, label).await;
            state.refresh_browser_status().await;
        }
        Some(SystemFrame::Activate) => {
            state.hub.windows.update_by_peer(&peer.id, None, None, Some(true), None).await;
        }
        Some(SystemFrame::Deactivate) => {
            state.hub.windows.update_by_peer(&peer.id, None, None, Some(false), None).await;
        }
        Some(SystemFrame::Focus { window_id }) => {
            if state.hub.windows.set_focused(Some(&window_id)).await {
                state.refresh_browser_status().await;
            }
        }
        None => debug!(action = %frame.action, "ignoring unrecognised system frame"),
    }
}

/// Push the current window table to every page (except `skip`), so tabs
/// can coordinate ownership.
async fn broadcast_window_state(state: &Arc<Store>, skip: Option<&str>) {
    let frame = state.hub.window_state_frame().await;
    let text = frame.to_text();
    for page in state.hub.peers.list(PeerRole::Page) {
        if Some(page.id.as_str()) != skip {
            page.send(&text);
        }
    }
}

// -- Agent observers ----------------------------------------------------------

pub async fn agent_handler(
    State(state): State<Arc<Store>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| agent_connection(state, socket))
}

async fn agent_connection(state: Arc<Store>, socket: WebSocket) {
    let (peer, mut out_rx) = state.hub.peers.add(PeerRole::AgentObserver, None);
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Replay first, then live traffic — the bus guarantees no gap.
    let (replay, mut bus_rx) = state.hub.bus.attach().await;
    for text in replay {
        if send_text(&mut ws_tx, text).await.is_err() {
            state.hub.peers.remove(&peer.id);
            return;
        }
    }

    loop {
        tokio::select! {
            event = bus_rx.recv() => {
                match event {
                    Ok(text) => {
                        if send_text(&mut ws_tx, text).await.is_err() {
                            break;
                        }
                    }
                    // Lagged observers skip ahead rather than disconnect.
                    Err(_) => continue,
                }
            }
            outbound = out_rx.recv() => {
                let Some(text) = outbound else { break };
                if send_text(&mut ws_tx, text).await.is_err() {
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(_))) => state.hub.peers.touch(&peer.id),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.hub.peers.remove(&peer.id);
}

// -- Terminals ----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TerminalQuery {
    /// Shell session this terminal observes for (from `register-shell`).
    pub shell: Option<String>,
    /// Register a fresh shell identity at upgrade (WS-only terminals).
    #[serde(default)]
    pub register: bool,
}

pub async fn terminal_handler(
    State(state): State<Arc<Store>>,
    Query(query): Query<TerminalQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| terminal_connection(state, socket, query))
}

async fn terminal_connection(state: Arc<Store>, socket: WebSocket, query: TerminalQuery) {
    let mut registered = None;
    let shell = match query.shell {
        Some(shell) => Some(shell),
        None if query.register => {
            let session = state.agents.register(state.settings.project_dir.clone()).await;
            registered = Some((session.id.clone(), session.name().await));
            Some(session.id.clone())
        }
        None => None,
    };

    let (peer, mut out_rx) = state.hub.peers.add(PeerRole::Terminal, shell);
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut status_rx = state.status.subscribe();

    if let Some((shell_id, name)) = registered {
        let hello =
            Frame::system("shell-registered", json!({ "shellId": shell_id, "name": name }));
        if send_text(&mut ws_tx, hello.to_text()).await.is_err() {
            state.hub.peers.remove(&peer.id);
            return;
        }
    }

    // Seed the terminal with the current status line.
    let line = state.status.status_line().await;
    if send_text(&mut ws_tx, Frame::system("status", json!({ "line": line })).to_text())
        .await
        .is_err()
    {
        state.hub.peers.remove(&peer.id);
        return;
    }

    loop {
        tokio::select! {
            status = status_rx.recv() => {
                match status {
                    Ok(frame) => {
                        if send_text(&mut ws_tx, frame.to_text()).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => continue,
                }
            }
            outbound = out_rx.recv() => {
                let Some(text) = outbound else { break };
                if send_text(&mut ws_tx, text).await.is_err() {
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        state.hub.peers.touch(&peer.id);
                        handle_terminal_text(&state, &peer, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.hub.peers.remove(&peer.id);
    if let Some(shell_id) = &peer.shell_id {
        let departure = Frame::system("shell-departed", json!({ "shellId": shell_id }));
        state.hub.broadcast_to_terminals(&departure).await;
    }
}

/// Commands a WS-only terminal can issue on its own socket; each gets a
/// correlated reply. REST remains the richer surface.
async fn handle_terminal_text(state: &Arc<Store>, peer: &Arc<PeerHandle>, text: &str) {
    let frame = match Incoming::parse(text) {
        Ok(Incoming::Frame(frame)) => frame,
        Ok(Incoming::Reply(_)) => return,
        Err(e) => {
            warn!(peer = %peer.id, "dropping malformed terminal frame: {e}");
            return;
        }
    };
    if frame.channel != "terminal" {
        debug!(channel = %frame.channel, "ignoring non-terminal frame from terminal peer");
        return;
    }
    let shell_name = match &peer.shell_id {
        Some(shell_id) => match state.agents.get(shell_id).await {
            Some(session) => session.name().await,
            None => "anonymous".to_owned(),
        },
        None => "anonymous".to_owned(),
    };
    let reply = match frame.action.as_str() {
        "tasks" => {
            let command = frame
                .payload
                .get("command")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            match crate::board::BoardCommand::parse(command) {
                Ok(command) => match state.board.execute(command, &shell_name).await {
                    Ok(result) => {
                        state.status.update("tasks", &state.board.summary().await).await;
                        crate::frame::Reply::ok(
                            &frame.id,
                            serde_json::to_value(result).unwrap_or_default(),
                        )
                    }
                    Err(message) => crate::frame::Reply::err(&frame.id, &message),
                },
                Err(hint) => crate::frame::Reply::err(&frame.id, &hint),
            }
        }
        "dm" => {
            let to = frame.payload.get("to").and_then(serde_json::Value::as_str).unwrap_or("");
            let text =
                frame.payload.get("text").and_then(serde_json::Value::as_str).unwrap_or("");
            let target = to.strip_prefix('@').unwrap_or(to);
            let delivered = match state.agents.find_by_name(target).await {
                Some(session) => match state.hub.peers.terminal_for_shell(&session.id) {
                    Some(terminal) => terminal.send(
                        &Frame::system("dm", json!({ "from": shell_name, "text": text }))
                            .to_text(),
                    ),
                    None => false,
                },
                None => false,
            };
            if delivered {
                crate::frame::Reply::ok(&frame.id, json!({ "delivered": true }))
            } else {
                crate::frame::Reply::err(&frame.id, &format!("no shell named {target:?}"))
            }
        }
        "status" => crate::frame::Reply::ok(
            &frame.id,
            json!({ "line": state.status.status_line().await }),
        ),
        other => crate::frame::Reply::err(&frame.id, &format!("unknown terminal action {other:?}")),
    };
    peer.send(&reply.to_text());
}
