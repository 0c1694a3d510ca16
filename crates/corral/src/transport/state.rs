// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::board::TaskBoard;
use crate::hub::Hub;
use crate::status::StatusState;
use crate::supervisor::Supervisor;

/// Shared application state passed to all handlers via the axum `State`
/// extractor. One sub-struct per concern; nothing here is a singleton —
/// the whole store is built in `run::prepare` and dropped on shutdown.
pub struct Store {
    pub hub: Hub,
    pub agents: Supervisor,
    pub board: TaskBoard,
    pub status: StatusState,
    pub settings: ServerSettings,
    pub lifecycle: LifecycleState,
}

/// Static server configuration (immutable after construction).
pub struct ServerSettings {
    pub started_at: Instant,
    /// Applied when a call carries no `timeout_ms`.
    pub default_call_timeout: Duration,
    /// Project directory holding `.corral/` (board, transcripts).
    pub project_dir: PathBuf,
}

/// Runtime lifecycle primitives.
pub struct LifecycleState {
    pub shutdown: CancellationToken,
}

impl Store {
    /// Recompute the browser status item from the current window table.
    /// Called whenever a window connects, disconnects, or focus moves.
    pub async fn refresh_browser_status(&self) {
        let focused = match self.hub.windows.focused().await {
            Some(id) => self.hub.windows.get(&id).await,
            None => None,
        };
        let count = self.hub.windows.len().await;
        self.status.set_browser_status(focused.as_ref(), count).await;
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("project_dir", &self.settings.project_dir)
            .finish()
    }
}
