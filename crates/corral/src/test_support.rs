// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, mock child backend, servers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::board::TaskBoard;
use crate::hub::Hub;
use crate::status::StatusState;
use crate::supervisor::{
    ChildBackend, ChildHandle, ChildSettings, ChildStream, Supervisor,
};
use crate::transport::state::{LifecycleState, ServerSettings, Store};
use crate::transport::build_router;

/// Child backend that records spawns and never produces output. The
/// stream stays open, so sessions sit in `thinking` until the test says
/// otherwise.
#[derive(Default)]
pub struct InertChildBackend {
    spawn_count: AtomicUsize,
    streams: std::sync::Mutex<Vec<mpsc::Sender<ChildStream>>>,
}

impl InertChildBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spawns(&self) -> usize {
        self.spawn_count.load(Ordering::Relaxed)
    }

    /// Stream sender of the nth spawn, for driving events from a test.
    pub fn stream(&self, index: usize) -> Option<mpsc::Sender<ChildStream>> {
        self.streams.lock().ok().and_then(|s| s.get(index).cloned())
    }
}

impl ChildBackend for Arc<InertChildBackend> {
    fn spawn(
        &self,
        _settings: &ChildSettings,
        _cwd: &Path,
        _first_message: &str,
        stream_tx: mpsc::Sender<ChildStream>,
    ) -> anyhow::Result<ChildHandle> {
        self.spawn_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut streams) = self.streams.lock() {
            streams.push(stream_tx);
        }
        let (stdin_tx, _stdin_rx) = mpsc::channel(32);
        Ok(ChildHandle::new(None, stdin_tx))
    }
}

/// Builder for a [`Store`] with test defaults.
pub struct StoreBuilder {
    project_dir: PathBuf,
    call_timeout: Duration,
    backend: Option<Box<dyn ChildBackend>>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            project_dir: std::env::temp_dir().join("corral-test"),
            call_timeout: Duration::from_millis(500),
            backend: None,
        }
    }

    pub fn project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn child_backend(mut self, backend: Box<dyn ChildBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> Arc<Store> {
        let agents = match self.backend {
            Some(backend) => Supervisor::with_backend(ChildSettings::default(), backend),
            None => Supervisor::with_backend(
                ChildSettings::default(),
                Box::new(InertChildBackend::new()),
            ),
        };
        Arc::new(Store {
            hub: Hub::new(),
            agents,
            board: TaskBoard::new(&self.project_dir),
            status: StatusState::new(),
            settings: ServerSettings {
                started_at: Instant::now(),
                default_call_timeout: self.call_timeout,
                project_dir: self.project_dir,
            },
            lifecycle: LifecycleState { shutdown: CancellationToken::new() },
        })
    }
}

/// Spawn an HTTP server on a random port for integration testing.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_http_server(
    store: Arc<Store>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let router = build_router(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}
