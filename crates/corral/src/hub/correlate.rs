// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-response correlator.
//!
//! Turns the asynchronous framed channel into call semantics: `issue`
//! registers a waiter under a fresh correlation id, `deliver` wakes it,
//! and the waiter resolves itself with a timeout value when the page
//! never answers. Waiters always resolve to a [`CallReply`] — callers
//! never see a transport-level error type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::frame::Reply;

/// Error string for a call the page never answered.
pub const TIMEOUT_ERROR: &str = "Timeout";

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);

/// The value every call resolves to, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct CallReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallReply {
    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }

    pub fn timeout() -> Self {
        Self::failure(TIMEOUT_ERROR)
    }
}

impl From<Reply> for CallReply {
    fn from(reply: Reply) -> Self {
        Self { success: reply.success, data: reply.data, error: reply.error }
    }
}

struct PendingEntry {
    tx: oneshot::Sender<CallReply>,
    /// Page peer the request was dispatched to; lets peer teardown fail
    /// everything in flight toward a dead connection.
    peer_id: String,
}

/// Map of in-flight correlation ids to their waiters.
pub struct PendingMap {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

/// Handle returned by [`PendingMap::issue`]; awaiting it yields the reply.
pub struct Waiter {
    id: String,
    rx: oneshot::Receiver<CallReply>,
    timeout: Duration,
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingMap {
    pub fn new() -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Register a waiter for a fresh, globally-unique correlation id.
    pub async fn issue(&self, peer_id: &str, timeout: Duration) -> (String, Waiter) {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.entries
            .lock()
            .await
            .insert(id.clone(), PendingEntry { tx, peer_id: peer_id.to_owned() });
        let waiter =
            Waiter { id: id.clone(), rx, timeout, entries: Arc::clone(&self.entries) };
        (id, waiter)
    }

    /// Wake the waiter registered under the reply's id. No-op when the id
    /// is unknown (already expired, or never issued).
    pub async fn deliver(&self, reply: Reply) {
        let entry = self.entries.lock().await.remove(&reply.id);
        if let Some(entry) = entry {
            let _ = entry.tx.send(CallReply::from(reply));
        }
    }

    /// Resolve one in-flight call with an error (e.g. the send failed).
    pub async fn fail(&self, id: &str, error: &str) {
        let entry = self.entries.lock().await.remove(id);
        if let Some(entry) = entry {
            let _ = entry.tx.send(CallReply::failure(error));
        }
    }

    /// Resolve every call dispatched to `peer_id` with a transport error.
    pub async fn fail_peer(&self, peer_id: &str, error: &str) {
        let failed: Vec<PendingEntry> = {
            let mut entries = self.entries.lock().await;
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.peer_id == peer_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter().filter_map(|id| entries.remove(&id)).collect()
        };
        for entry in failed {
            let _ = entry.tx.send(CallReply::failure(error));
        }
    }

    /// Number of in-flight requests.
    pub async fn in_flight(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.lock().await.contains_key(id)
    }
}

impl Default for PendingMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Waiter {
    /// Await the correlated reply.
    ///
    /// Resolves with the delivered reply, a timeout value after the
    /// deadline (removing the map entry so nothing leaks), or a transport
    /// error if the entry was dropped without delivery.
    pub async fn wait(self) -> CallReply {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => CallReply::failure("connection closed"),
            Err(_) => {
                self.entries.lock().await.remove(&self.id);
                CallReply::timeout()
            }
        }
    }
}

#[cfg(test)]
#[path = "correlate_tests.rs"]
mod tests;
