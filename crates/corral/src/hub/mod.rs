// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session and routing core: peers, windows, correlation, fan-out.
//!
//! The hub owns every piece of connection-scoped state. Windows reference
//! peers by stable id rather than holding connections, so eviction and
//! disconnect can never touch a dead socket.

pub mod affinity;
pub mod bus;
pub mod correlate;
pub mod peer;
pub mod route;
pub mod window;

use serde_json::Value;

use crate::frame::{Frame, Reply};

pub use affinity::SessionAffinity;
pub use bus::BusState;
pub use correlate::{CallReply, PendingMap};
pub use peer::{PeerHandle, PeerRegistry, PeerRole};
pub use route::CallRequest;
pub use window::{ClaimOutcome, ResolveError, WindowClaim, WindowInfo, WindowTable};

/// Connection-scoped state shared by every transport handler.
pub struct Hub {
    pub peers: PeerRegistry,
    pub windows: WindowTable,
    pub affinity: SessionAffinity,
    pub pending: PendingMap,
    pub bus: BusState,
    /// Identifies this server process; pages reporting a different id are
    /// asked to reload.
    pub server_session_id: String,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            peers: PeerRegistry::new(),
            windows: WindowTable::new(),
            affinity: SessionAffinity::new(),
            pending: PendingMap::new(),
            bus: BusState::new(),
            server_session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Route a reply frame to its waiting caller. Unknown ids are dropped.
    pub async fn deliver_reply(&self, reply: Reply) {
        self.pending.deliver(reply).await;
    }

    /// Echo a system frame from one page to every other connected page.
    pub async fn echo_to_other_pages(&self, from_peer: &str, frame: &Frame) {
        let text = frame.to_text();
        for peer in self.peers.list(PeerRole::Page) {
            if peer.id != from_peer {
                peer.send(&text);
            }
        }
    }

    /// Broadcast a frame to every terminal peer.
    pub async fn broadcast_to_terminals(&self, frame: &Frame) {
        let text = frame.to_text();
        for peer in self.peers.list(PeerRole::Terminal) {
            peer.send(&text);
        }
    }

    /// Snapshot of the window table as a system frame payload, sent to
    /// pages so tabs can coordinate ownership.
    pub async fn window_state_frame(&self) -> Frame {
        let windows = self.windows.list().await;
        let focused = self.windows.focused().await;
        Frame::system(
            "window-state",
            serde_json::json!({ "windows": windows, "focusedWindowId": focused }),
        )
    }

    /// Tear down a page peer: fail its in-flight calls, drop its window.
    ///
    /// Returns the dropped window id, if the peer owned one.
    pub async fn drop_page_peer(&self, peer_id: &str) -> Option<String> {
        self.pending.fail_peer(peer_id, "page disconnected").await;
        self.peers.remove(peer_id);
        self.windows.drop_peer(peer_id).await
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Inject the resolved window id into a payload that doesn't target one,
/// so the page can verify it is the intended recipient.
pub fn inject_window_id(payload: &mut Value, window_id: &str) {
    if payload.is_null() {
        *payload = Value::Object(serde_json::Map::new());
    }
    // Non-object payloads pass through untouched.
    if let Some(map) = payload.as_object_mut() {
        if !map.contains_key("windowId") {
            map.insert("windowId".to_owned(), Value::String(window_id.to_owned()));
        }
    }
}
