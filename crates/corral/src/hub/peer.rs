// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of live duplex connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::clock::now_ms;

/// Outbound queue depth per peer. A peer that falls this far behind has
/// its frames dropped rather than stalling other connections.
const OUTBOUND_CAP: usize = 256;

/// What kind of peer is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Page,
    AgentObserver,
    Terminal,
}

/// One live connection. The socket sink is owned by a writer task fed
/// through `tx`; nothing else ever touches the socket.
pub struct PeerHandle {
    pub id: String,
    pub role: PeerRole,
    /// Shell session this peer observes for (terminal peers only, from
    /// the `shell` query parameter at upgrade).
    pub shell_id: Option<String>,
    tx: mpsc::Sender<String>,
    last_seen: AtomicU64,
    closed: CancellationToken,
}

impl PeerHandle {
    /// Queue a text frame for delivery. Slow consumers lose frames.
    pub fn send(&self, text: &str) -> bool {
        match self.tx.try_send(text.to_owned()) {
            Ok(()) => true,
            Err(_) => {
                warn!(peer = %self.id, "outbound queue full, dropping frame");
                false
            }
        }
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    /// Ask the connection loop to hang up (used when a window id is
    /// reclaimed by another page).
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Token the connection loop selects on.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// All live peers, keyed by id.
pub struct PeerRegistry {
    peers: std::sync::RwLock<HashMap<String, Arc<PeerHandle>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self { peers: std::sync::RwLock::new(HashMap::new()) }
    }

    /// Register a new peer and hand back its handle plus the receiver the
    /// connection's writer task drains.
    pub fn add(&self, role: PeerRole, shell_id: Option<String>) -> (Arc<PeerHandle>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAP);
        let handle = Arc::new(PeerHandle {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            shell_id,
            tx,
            last_seen: AtomicU64::new(now_ms()),
            closed: CancellationToken::new(),
        });
        if let Ok(mut peers) = self.peers.write() {
            peers.insert(handle.id.clone(), Arc::clone(&handle));
        }
        (handle, rx)
    }

    pub fn remove(&self, id: &str) {
        if let Ok(mut peers) = self.peers.write() {
            peers.remove(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<PeerHandle>> {
        self.peers.read().ok().and_then(|peers| peers.get(id).cloned())
    }

    /// Refresh a peer's last-seen timestamp.
    pub fn touch(&self, id: &str) {
        if let Some(peer) = self.get(id) {
            peer.last_seen.store(now_ms(), Ordering::Relaxed);
        }
    }

    /// Queue a frame for one peer. Returns false if the peer is gone or
    /// its queue is full.
    pub fn send_to(&self, id: &str, text: &str) -> bool {
        match self.get(id) {
            Some(peer) => peer.send(text),
            None => false,
        }
    }

    /// Snapshot of all peers with the given role.
    pub fn list(&self, role: PeerRole) -> Vec<Arc<PeerHandle>> {
        self.peers
            .read()
            .map(|peers| peers.values().filter(|p| p.role == role).cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, role: PeerRole) -> usize {
        self.list(role).len()
    }

    /// Find the terminal peer observing the given shell session.
    pub fn terminal_for_shell(&self, shell_id: &str) -> Option<Arc<PeerHandle>> {
        self.list(PeerRole::Terminal)
            .into_iter()
            .find(|p| p.shell_id.as_deref() == Some(shell_id))
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
