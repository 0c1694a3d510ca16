// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level server runner — shared by `main` and integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::board::TaskBoard;
use crate::config::Config;
use crate::hub::Hub;
use crate::status::{StatusState, NO_BROWSER_STATUS};
use crate::supervisor::{AgentEvent, AgentStatus, Supervisor};
use crate::transport::build_router;
use crate::transport::state::{LifecycleState, ServerSettings, Store};

/// Initialise tracing from the config. Safe to call more than once.
pub fn init_logging(config: &Config) {
    use tracing_subscriber::fmt;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let _ = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
}

/// Assemble the shared store from a validated config.
pub fn build_store(config: &Config) -> Arc<Store> {
    let project_dir = config.resolved_project_dir();
    Arc::new(Store {
        hub: Hub::new(),
        agents: Supervisor::new(config.child_settings()),
        board: TaskBoard::new(&project_dir),
        status: StatusState::new(),
        settings: ServerSettings {
            started_at: Instant::now(),
            default_call_timeout: Duration::from_millis(config.call_timeout_ms),
            project_dir,
        },
        lifecycle: LifecycleState { shutdown: CancellationToken::new() },
    })
}

/// Pump supervisor events into the status line and out to terminals.
pub fn spawn_agent_event_pump(store: Arc<Store>) -> JoinHandle<()> {
    let mut events = store.agents.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = store.lifecycle.shutdown.cancelled() => break,
                event = events.recv() => {
                    let event = match event {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    };
                    if let AgentEvent::Status { name, status, .. } = &event {
                        let value = match status {
                            AgentStatus::Idle => String::new(),
                            other => other.as_str().to_owned(),
                        };
                        store.status.update(&format!("agent:{name}"), &value).await;
                    }
                    store.hub.broadcast_to_terminals(&event.to_frame()).await;
                }
            }
        }
    })
}

/// Seed the status line and start the background pumps.
pub async fn prepare(store: &Arc<Store>) {
    store.status.update("browser", NO_BROWSER_STATUS).await;
    store.status.update("tasks", &store.board.summary().await).await;
    let _ = spawn_agent_event_pump(Arc::clone(store));
}

/// Run the server until shutdown is requested.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_logging(&config);
    let store = build_store(&config);
    prepare(&store).await;

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    info!(%addr, project = %store.settings.project_dir.display(), "corral listening");

    let shutdown = store.lifecycle.shutdown.clone();
    let router = build_router(Arc::clone(&store));
    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    });
    serve.await?;
    info!("corral stopped");
    Ok(())
}
