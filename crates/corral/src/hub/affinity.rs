// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-session → preferred-window map.
//!
//! Tokens arrive in the `X-Corral-Session` header and are opaque to the
//! server. Entries are written when a caller explicitly targets a window
//! and read only when a request has neither explicit target nor focused
//! window override. Stale entries are fine — resolution skips windows
//! that are no longer live.

use std::collections::HashMap;

use tokio::sync::RwLock;

pub struct SessionAffinity {
    map: RwLock<HashMap<String, String>>,
}

impl SessionAffinity {
    pub fn new() -> Self {
        Self { map: RwLock::new(HashMap::new()) }
    }

    pub async fn get(&self, session: &str) -> Option<String> {
        self.map.read().await.get(session).cloned()
    }

    pub async fn set(&self, session: &str, window_id: &str) {
        self.map.write().await.insert(session.to_owned(), window_id.to_owned());
    }
}

impl Default for SessionAffinity {
    fn default() -> Self {
        Self::new()
    }
}
