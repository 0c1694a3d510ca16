// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Window table: stable `windowId` → owning page peer, plus the focused
//! pointer and the target-resolution policy for untargeted commands.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::frame::{now_ms, Identity, WindowType};

/// A logical browser tab. Outlives page reloads; the `page_instance_id`
/// changes on every load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub window_id: String,
    pub page_instance_id: String,
    /// Stable id of the owning page peer — never a connection handle.
    pub peer_id: String,
    pub url: String,
    pub title: String,
    pub active: bool,
    pub window_type: WindowType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub connected_at: u64,
    pub last_seen: u64,
}

/// What a `claim` did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First connection for this window id.
    New,
    /// Same peer re-announced (idempotent) or announced a fresh page
    /// instance — a reload without a disconnect counts as a reconnect.
    Reconnected,
    /// Another peer owned the id; the caller must close the prior
    /// connection to uphold the one-owner invariant.
    Evicted { prior_peer: String },
}

/// Arguments to [`WindowTable::claim`].
#[derive(Debug, Clone)]
pub struct WindowClaim {
    pub window_id: String,
    pub page_instance_id: String,
    pub url: String,
    pub title: String,
    pub active: bool,
    pub window_type: WindowType,
}

impl From<&Identity> for WindowClaim {
    fn from(identity: &Identity) -> Self {
        Self {
            window_id: identity.window_id.clone(),
            page_instance_id: identity.page_instance_id.clone(),
            url: identity.url.clone(),
            title: identity.title.clone(),
            active: identity.active,
            window_type: identity.window_type,
        }
    }
}

/// Why target resolution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// An explicit target was named but no such window is connected.
    NotFound(String),
    /// Nothing is connected at all (or nothing matched).
    NoWindows,
}

impl ResolveError {
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(id) => format!("Window {id} not found"),
            Self::NoWindows => "No windows connected".to_owned(),
        }
    }
}

struct TableInner {
    windows: IndexMap<String, WindowInfo>,
    focused: Option<String>,
}

/// The table itself. Insertion order is preserved so focus advancement
/// after a disconnect is deterministic.
pub struct WindowTable {
    inner: RwLock<TableInner>,
}

impl WindowTable {
    pub fn new() -> Self {
        Self { inner: RwLock::new(TableInner { windows: IndexMap::new(), focused: None }) }
    }

    /// Associate a window id with a page peer.
    ///
    /// Idempotent for the same peer. If another peer owns the id, the
    /// entry is taken over and the prior peer id is returned for closing.
    /// The first window to connect becomes focused.
    pub async fn claim(&self, claim: WindowClaim, peer_id: &str) -> ClaimOutcome {
        let mut inner = self.inner.write().await;
        let now = now_ms();
        let outcome = match inner.windows.get_mut(&claim.window_id) {
            Some(existing) if existing.peer_id == peer_id => {
                existing.page_instance_id = claim.page_instance_id;
                existing.url = claim.url;
                existing.title = claim.title;
                existing.active = claim.active;
                existing.last_seen = now;
                ClaimOutcome::Reconnected
            }
            Some(existing) => {
                let prior = existing.peer_id.clone();
                existing.peer_id = peer_id.to_owned();
                existing.page_instance_id = claim.page_instance_id;
                existing.url = claim.url;
                existing.title = claim.title;
                existing.active = claim.active;
                existing.last_seen = now;
                ClaimOutcome::Evicted { prior_peer: prior }
            }
            None => {
                inner.windows.insert(
                    claim.window_id.clone(),
                    WindowInfo {
                        window_id: claim.window_id.clone(),
                        page_instance_id: claim.page_instance_id,
                        peer_id: peer_id.to_owned(),
                        url: claim.url,
                        title: claim.title,
                        active: claim.active,
                        window_type: claim.window_type,
                        label: None,
                        connected_at: now,
                        last_seen: now,
                    },
                );
                ClaimOutcome::New
            }
        };
        if inner.focused.is_none() {
            inner.focused = Some(claim.window_id);
        }
        outcome
    }

    /// Refresh mutable fields on the window owned by `peer_id`.
    pub async fn update_by_peer(
        &self,
        peer_id: &str,
        url: Option<String>,
        title: Option<String>,
        active: Option<bool>,
        label: Option<String>,
    ) {
        let mut inner = self.inner.write().await;
        if let Some(window) = inner.windows.values_mut().find(|w| w.peer_id == peer_id) {
            if let Some(url) = url {
                window.url = url;
            }
            if let Some(title) = title {
                window.title = title;
            }
            if let Some(active) = active {
                window.active = active;
            }
            if label.is_some() {
                window.label = label;
            }
            window.last_seen = now_ms();
        }
    }

    /// Mark the peer's window as recently seen.
    pub async fn touch_peer(&self, peer_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(window) = inner.windows.values_mut().find(|w| w.peer_id == peer_id) {
            window.last_seen = now_ms();
        }
    }

    /// Remove the window owned by `peer_id`, advancing focus if needed.
    ///
    /// Returns the dropped window id. Focus moves to the next window in
    /// insertion order, or clears when none remain — it never points at a
    /// dead window.
    pub async fn drop_peer(&self, peer_id: &str) -> Option<String> {
        let mut inner = self.inner.write().await;
        let window_id = inner
            .windows
            .values()
            .find(|w| w.peer_id == peer_id)
            .map(|w| w.window_id.clone())?;
        inner.windows.shift_remove(&window_id);
        if inner.focused.as_deref() == Some(window_id.as_str()) {
            inner.focused = inner.windows.keys().next().cloned();
        }
        Some(window_id)
    }

    /// Resolve the window an untargeted (or targeted) command should go
    /// to. Strict priority:
    ///
    /// 1. explicit window id (must be connected)
    /// 2. session-affine window, if live
    /// 3. focused window
    /// 4. most recently seen window with `active == true`
    /// 5. most recently seen window
    pub async fn resolve_target(
        &self,
        explicit: Option<&str>,
        affine: Option<&str>,
    ) -> Result<String, ResolveError> {
        let inner = self.inner.read().await;
        if let Some(id) = explicit {
            return if inner.windows.contains_key(id) {
                Ok(id.to_owned())
            } else {
                Err(ResolveError::NotFound(id.to_owned()))
            };
        }
        if let Some(id) = affine {
            if inner.windows.contains_key(id) {
                return Ok(id.to_owned());
            }
        }
        if let Some(id) = &inner.focused {
            if inner.windows.contains_key(id) {
                return Ok(id.clone());
            }
        }
        if let Some(window) = inner.windows.values().filter(|w| w.active).max_by_key(|w| w.last_seen)
        {
            return Ok(window.window_id.clone());
        }
        if let Some(window) = inner.windows.values().max_by_key(|w| w.last_seen) {
            return Ok(window.window_id.clone());
        }
        Err(ResolveError::NoWindows)
    }

    /// Peer that owns the given window.
    pub async fn owner_of(&self, window_id: &str) -> Option<String> {
        self.inner.read().await.windows.get(window_id).map(|w| w.peer_id.clone())
    }

    pub async fn focused(&self) -> Option<String> {
        self.inner.read().await.focused.clone()
    }

    /// Explicitly re-focus (`Some`) or clear focus entirely (`None`).
    /// Focusing an unconnected window fails.
    pub async fn set_focused(&self, window_id: Option<&str>) -> bool {
        let mut inner = self.inner.write().await;
        match window_id {
            Some(id) if inner.windows.contains_key(id) => {
                inner.focused = Some(id.to_owned());
                true
            }
            Some(_) => false,
            None => {
                inner.focused = None;
                true
            }
        }
    }

    pub async fn get(&self, window_id: &str) -> Option<WindowInfo> {
        self.inner.read().await.windows.get(window_id).cloned()
    }

    pub async fn list(&self) -> Vec<WindowInfo> {
        self.inner.read().await.windows.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.windows.len()
    }
}

impl Default for WindowTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
