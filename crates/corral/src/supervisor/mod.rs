// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent sessions and the subprocess supervisor.
//!
//! Each session owns at most one assistant child. The child's stdout is
//! parsed by a dedicated pump task which appends transcript entries,
//! drives the status machine, and broadcasts typed events. Interrupts
//! are fire-and-forget: signal, clear the handle, mark idle — a
//! follow-up prompt can start a fresh child immediately.

pub mod child;
pub mod parse;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{info, warn};

use crate::clock::now_ms;
use crate::frame::Frame;
use crate::transcript::{self, TranscriptEntry, TranscriptFile};

pub use child::{ChildExit, ChildHandle, ChildSettings, ChildStream};
pub use parse::ChildEvent;

/// Friendly names handed to new sessions, first free one wins.
const NAME_POOL: [&str; 20] = [
    "amber", "basil", "cedar", "delta", "ember", "fable", "garnet", "harbor", "indigo",
    "juniper", "lumen", "maple", "nectar", "onyx", "quartz", "rowan", "sable", "tundra",
    "willow", "zephyr",
];

/// Number of trailing entries condensed into a restore context.
const RESTORE_CONTEXT_ENTRIES: usize = 8;

/// Session status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Done,
    Error,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// A queued mid-flight message, prepended to the next prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub from: String,
    pub text: String,
}

/// Outcome of [`Supervisor::interrupt_and_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptOutcome {
    /// Session was idle — the message went straight out as a prompt.
    Sent,
    /// Child was running — interrupted, message queued for the restart.
    Queued,
    NotFound,
}

#[derive(Debug, PartialEq)]
pub enum SupervisorError {
    NotFound,
    SpawnFailed(String),
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("no such agent session"),
            Self::SpawnFailed(detail) => write!(f, "agent failed to start: {detail}"),
        }
    }
}

/// Typed events broadcast to transports and the status pump.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Status { session_id: String, name: String, status: AgentStatus },
    AssistantText { session_id: String, text: String },
    ToolCall { session_id: String, tool: String, call_id: String, input: String },
    ToolResult { session_id: String, call_id: String, output: String },
    Text { session_id: String, text: String },
    Completed { session_id: String, cost_usd: Option<f64>, duration_ms: Option<u64> },
    Error { session_id: String, detail: String },
}

impl AgentEvent {
    /// Wire form for terminal observers.
    pub fn to_frame(&self) -> Frame {
        let action = match self {
            Self::Status { .. } => "agent-status",
            Self::AssistantText { .. } => "agent-text",
            Self::ToolCall { .. } => "agent-tool-call",
            Self::ToolResult { .. } => "agent-tool-result",
            Self::Text { .. } => "agent-output",
            Self::Completed { .. } => "agent-completed",
            Self::Error { .. } => "agent-error",
        };
        Frame::new("agent", action, serde_json::to_value(self).unwrap_or_default(), "server")
    }
}

/// One conversational session.
pub struct AgentSession {
    pub id: String,
    pub created_at: u64,
    name: RwLock<String>,
    status: RwLock<AgentStatus>,
    cwd: RwLock<PathBuf>,
    transcript: RwLock<Vec<TranscriptEntry>>,
    queue: Mutex<VecDeque<QueuedMessage>>,
    child: Mutex<Option<ChildHandle>>,
    /// One-shot prelude injected into the first prompt after a restore.
    restored_context: Mutex<Option<String>>,
    /// Monotonic spawn counter; pump tasks only tear down state for the
    /// child generation they belong to.
    generation: AtomicU64,
}

impl AgentSession {
    fn new(id: String, name: String, cwd: PathBuf) -> Self {
        Self {
            id,
            created_at: now_ms(),
            name: RwLock::new(name),
            status: RwLock::new(AgentStatus::Idle),
            cwd: RwLock::new(cwd),
            transcript: RwLock::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            child: Mutex::new(None),
            restored_context: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn name(&self) -> String {
        self.name.read().await.clone()
    }

    pub async fn status(&self) -> AgentStatus {
        *self.status.read().await
    }

    pub async fn cwd(&self) -> PathBuf {
        self.cwd.read().await.clone()
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.read().await.clone()
    }

    pub async fn queued_messages(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn restored_context(&self) -> Option<String> {
        self.restored_context.lock().await.clone()
    }

    async fn push_entry(&self, entry: TranscriptEntry) {
        self.transcript.write().await.push(entry);
    }

    /// Snapshot into the on-disk envelope form.
    pub async fn envelope(&self) -> TranscriptFile {
        TranscriptFile {
            version: 1,
            shell_id: self.id.clone(),
            name: self.name().await,
            created_at: self.created_at,
            updated_at: now_ms(),
            cwd: self.cwd().await.to_string_lossy().into_owned(),
            transcript: self.transcript().await,
        }
    }
}

/// Listing row for `list-shells`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub name: String,
    pub status: AgentStatus,
    pub cwd: String,
    pub created_at: u64,
    pub queued_messages: usize,
}

/// Seam for tests: how a child actually comes to life.
pub trait ChildBackend: Send + Sync {
    fn spawn(
        &self,
        settings: &ChildSettings,
        cwd: &Path,
        first_message: &str,
        stream_tx: mpsc::Sender<ChildStream>,
    ) -> anyhow::Result<ChildHandle>;
}

/// The real thing: a subprocess speaking stream-json.
pub struct ProcessBackend;

impl ChildBackend for ProcessBackend {
    fn spawn(
        &self,
        settings: &ChildSettings,
        cwd: &Path,
        first_message: &str,
        stream_tx: mpsc::Sender<ChildStream>,
    ) -> anyhow::Result<ChildHandle> {
        child::spawn(settings, cwd, first_message, stream_tx)
    }
}

/// Registry and lifecycle manager for all agent sessions.
pub struct Supervisor {
    sessions: RwLock<IndexMap<String, Arc<AgentSession>>>,
    settings: ChildSettings,
    backend: Box<dyn ChildBackend>,
    event_tx: broadcast::Sender<AgentEvent>,
    fallback_names: AtomicU64,
}

impl Supervisor {
    pub fn new(settings: ChildSettings) -> Self {
        Self::with_backend(settings, Box::new(ProcessBackend))
    }

    pub fn with_backend(settings: ChildSettings, backend: Box<dyn ChildBackend>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            sessions: RwLock::new(IndexMap::new()),
            settings,
            backend,
            event_tx,
            fallback_names: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    /// Create a session with a pool name unique among live sessions.
    pub async fn register(&self, cwd: PathBuf) -> Arc<AgentSession> {
        let mut sessions = self.sessions.write().await;
        let mut in_use = Vec::with_capacity(sessions.len());
        for session in sessions.values() {
            in_use.push(session.name().await);
        }
        let name = self.pick_name(&in_use);
        let session =
            Arc::new(AgentSession::new(uuid::Uuid::new_v4().to_string(), name, cwd));
        sessions.insert(session.id.clone(), Arc::clone(&session));
        info!(session = %session.id, "registered agent session");
        session
    }

    fn pick_name(&self, in_use: &[String]) -> String {
        let offset = rand::random::<u32>() as usize % NAME_POOL.len();
        for i in 0..NAME_POOL.len() {
            let candidate = NAME_POOL[(offset + i) % NAME_POOL.len()];
            if !in_use.iter().any(|n| n == candidate) {
                return candidate.to_owned();
            }
        }
        let n = self.fallback_names.fetch_add(1, Ordering::Relaxed) + 1;
        format!("agent-{n}")
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<AgentSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Arc<AgentSession>> {
        for session in self.sessions.read().await.values() {
            if session.name().await == name {
                return Some(Arc::clone(session));
            }
        }
        None
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<AgentSession>> =
            self.sessions.read().await.values().cloned().collect();
        let mut rows = Vec::with_capacity(sessions.len());
        for session in sessions {
            rows.push(SessionSummary {
                session_id: session.id.clone(),
                name: session.name().await,
                status: session.status().await,
                cwd: session.cwd().await.to_string_lossy().into_owned(),
                created_at: session.created_at,
                queued_messages: session.queued_messages().await,
            });
        }
        rows
    }

    pub async fn rename(&self, session_id: &str, name: &str) -> bool {
        match self.get(session_id).await {
            Some(session) => {
                *session.name.write().await = name.to_owned();
                true
            }
            None => false,
        }
    }

    /// Remove a session entirely, interrupting any running child.
    pub async fn remove(&self, session_id: &str) -> bool {
        let Some(session) = self.sessions.write().await.shift_remove(session_id) else {
            return false;
        };
        if let Some(handle) = session.child.lock().await.take() {
            handle.interrupt();
        }
        true
    }

    /// Dispatch a prompt.
    ///
    /// Spawns a child if none is running; otherwise injects the text into
    /// the running child's stdin. The one-shot restore context and any
    /// queued messages are prepended, each under a labeled envelope.
    pub async fn prompt(&self, session_id: &str, text: &str) -> Result<(), SupervisorError> {
        let session = self.get(session_id).await.ok_or(SupervisorError::NotFound)?;
        let composed = compose_prompt(&session, text).await;

        session
            .push_entry(TranscriptEntry::User { text: composed.clone(), timestamp: now_ms() })
            .await;
        self.save_later(&session).await;

        let mut child = session.child.lock().await;
        if let Some(handle) = child.as_ref() {
            if handle.send_user_message(&composed) {
                drop(child);
                self.set_status(&session, AgentStatus::Thinking).await;
                return Ok(());
            }
            // Stdin is gone — the child is on its way out. Start fresh.
            *child = None;
        }

        let (stream_tx, stream_rx) = mpsc::channel(64);
        let cwd = session.cwd().await;
        let handle = self
            .backend
            .spawn(&self.settings, &cwd, &composed, stream_tx)
            .map_err(|e| {
                let detail = format!("{e:#}");
                warn!(session = session_id, "child spawn failed: {detail}");
                SupervisorError::SpawnFailed(detail)
            })?;
        let generation = session.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *child = Some(handle);
        drop(child);

        self.set_status(&session, AgentStatus::Thinking).await;
        self.spawn_pump(Arc::clone(&session), generation, stream_rx);
        Ok(())
    }

    /// Interrupt a thinking session, parking `message` for the restart.
    /// An idle session just gets the message as a prompt.
    pub async fn interrupt_and_queue(
        &self,
        session_id: &str,
        from: &str,
        message: &str,
    ) -> InterruptOutcome {
        let Some(session) = self.get(session_id).await else {
            return InterruptOutcome::NotFound;
        };
        let running = {
            let mut child = session.child.lock().await;
            match child.take() {
                Some(handle) => {
                    handle.interrupt();
                    true
                }
                None => false,
            }
        };
        if running {
            session
                .queue
                .lock()
                .await
                .push_back(QueuedMessage { from: from.to_owned(), text: message.to_owned() });
            self.set_status(&session, AgentStatus::Idle).await;
            InterruptOutcome::Queued
        } else {
            if let Err(e) = self.prompt(session_id, message).await {
                warn!(session = session_id, "interrupt-as-prompt failed: {e}");
            }
            InterruptOutcome::Sent
        }
    }

    /// Graceful stop; the session is immediately promptable again.
    pub async fn kill(&self, session_id: &str) -> bool {
        let Some(session) = self.get(session_id).await else { return false };
        if let Some(handle) = session.child.lock().await.take() {
            handle.interrupt();
        }
        self.set_status(&session, AgentStatus::Idle).await;
        true
    }

    /// Write one raw line into the running child without touching status.
    pub async fn send_to_child(&self, session_id: &str, text: &str) -> bool {
        let Some(session) = self.get(session_id).await else { return false };
        let child = session.child.lock().await;
        match child.as_ref() {
            Some(handle) => handle.send_user_message(text),
            None => false,
        }
    }

    /// Queue a message without interrupting (`send-to-agent` surface):
    /// pasted straight into a running child, parked otherwise.
    pub async fn deliver_or_queue(&self, session_id: &str, from: &str, text: &str) -> bool {
        let Some(session) = self.get(session_id).await else { return false };
        let child = session.child.lock().await;
        if let Some(handle) = child.as_ref() {
            if handle.send_user_message(&format!("[message from {from}] {text}")) {
                return true;
            }
        }
        drop(child);
        session
            .queue
            .lock()
            .await
            .push_back(QueuedMessage { from: from.to_owned(), text: text.to_owned() });
        true
    }

    /// Recreate a session from a saved transcript file.
    ///
    /// The new session borrows the saved name and cwd but starts with an
    /// empty transcript; a condensed context is injected exactly once on
    /// the next prompt. Carrying full history forward is deliberately not
    /// attempted.
    pub async fn restore(
        &self,
        cwd: &Path,
        file: &str,
    ) -> Result<Arc<AgentSession>, SupervisorError> {
        let saved = transcript::load(cwd, file).await.ok_or(SupervisorError::NotFound)?;
        let session = Arc::new(AgentSession::new(
            uuid::Uuid::new_v4().to_string(),
            saved.name.clone(),
            PathBuf::from(&saved.cwd),
        ));
        *session.restored_context.lock().await = condense(&saved);
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), Arc::clone(&session));
        info!(session = %session.id, file, "restored agent session");
        Ok(session)
    }

    async fn set_status(&self, session: &Arc<AgentSession>, status: AgentStatus) {
        *session.status.write().await = status;
        let _ = self.event_tx.send(AgentEvent::Status {
            session_id: session.id.clone(),
            name: session.name().await,
            status,
        });
    }

    /// Flush the transcript in the background; failures never propagate.
    async fn save_later(&self, session: &Arc<AgentSession>) {
        let envelope = session.envelope().await;
        tokio::spawn(async move {
            transcript::save(&envelope).await;
        });
    }

    fn spawn_pump(
        &self,
        session: Arc<AgentSession>,
        generation: u64,
        mut stream_rx: mpsc::Receiver<ChildStream>,
    ) {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(item) = stream_rx.recv().await {
                match item {
                    ChildStream::Event(event) => {
                        apply_event(&session, &event_tx, event).await;
                    }
                    ChildStream::Exited(exit) => {
                        finish(&session, &event_tx, generation, exit).await;
                        break;
                    }
                }
            }
        });
    }
}

/// Prepend the one-shot restore context and drained queue to the prompt.
async fn compose_prompt(session: &Arc<AgentSession>, text: &str) -> String {
    let mut parts = Vec::new();
    if let Some(context) = session.restored_context.lock().await.take() {
        parts.push(context);
    }
    let drained: Vec<QueuedMessage> = session.queue.lock().await.drain(..).collect();
    for message in drained {
        parts.push(format!("[message from {}] {}", message.from, message.text));
    }
    parts.push(text.to_owned());
    parts.join("\n\n")
}

async fn apply_event(
    session: &Arc<AgentSession>,
    event_tx: &broadcast::Sender<AgentEvent>,
    event: ChildEvent,
) {
    let session_id = session.id.clone();
    let out = match event {
        ChildEvent::AssistantText { text } => {
            session
                .push_entry(TranscriptEntry::Assistant { text: text.clone(), timestamp: now_ms() })
                .await;
            AgentEvent::AssistantText { session_id, text }
        }
        ChildEvent::ToolCall { tool, call_id, input } => {
            session
                .push_entry(TranscriptEntry::ToolCall {
                    tool: tool.clone(),
                    call_id: call_id.clone(),
                    input: input.clone(),
                    timestamp: now_ms(),
                })
                .await;
            AgentEvent::ToolCall { session_id, tool, call_id, input }
        }
        ChildEvent::ToolResult { call_id, output } => {
            session
                .push_entry(TranscriptEntry::ToolResult {
                    call_id: call_id.clone(),
                    output: output.clone(),
                    timestamp: now_ms(),
                })
                .await;
            AgentEvent::ToolResult { session_id, call_id, output }
        }
        ChildEvent::Text { text } => {
            session
                .push_entry(TranscriptEntry::System { text: text.clone(), timestamp: now_ms() })
                .await;
            AgentEvent::Text { session_id, text }
        }
        ChildEvent::Completed { cost_usd, duration_ms } => {
            *session.status.write().await = AgentStatus::Done;
            AgentEvent::Completed { session_id, cost_usd, duration_ms }
        }
    };
    let _ = event_tx.send(out);
}

/// Child exit: settle status, clear the handle, flush the transcript.
/// A stale pump (superseded by a newer spawn) only flushes.
async fn finish(
    session: &Arc<AgentSession>,
    event_tx: &broadcast::Sender<AgentEvent>,
    generation: u64,
    exit: ChildExit,
) {
    let current = session.generation.load(Ordering::Acquire) == generation;
    if current {
        *session.child.lock().await = None;
        let failed = exit.code != 0 && !exit.stderr.trim().is_empty();
        let status = if failed { AgentStatus::Error } else { AgentStatus::Idle };
        if failed {
            let detail = exit.stderr.trim().to_owned();
            session
                .push_entry(TranscriptEntry::System {
                    text: format!("agent exited with code {}: {detail}", exit.code),
                    timestamp: now_ms(),
                })
                .await;
            let _ = event_tx
                .send(AgentEvent::Error { session_id: session.id.clone(), detail });
        }
        *session.status.write().await = status;
        let _ = event_tx.send(AgentEvent::Status {
            session_id: session.id.clone(),
            name: session.name().await,
            status,
        });
    }
    transcript::save(&session.envelope().await).await;
}

/// Condense a saved transcript into a short one-shot context block.
fn condense(saved: &TranscriptFile) -> Option<String> {
    if saved.transcript.is_empty() {
        return None;
    }
    let mut lines = vec![format!(
        "Context restored from an earlier session named {:?}:",
        saved.name
    )];
    let tail = saved
        .transcript
        .iter()
        .rev()
        .take(RESTORE_CONTEXT_ENTRIES)
        .collect::<Vec<_>>();
    for entry in tail.into_iter().rev() {
        let line = match entry {
            TranscriptEntry::User { text, .. } => format!("user: {}", clip(text)),
            TranscriptEntry::Assistant { text, .. } => format!("assistant: {}", clip(text)),
            TranscriptEntry::ToolCall { tool, input, .. } => {
                format!("tool {tool}: {}", clip(input))
            }
            TranscriptEntry::ToolResult { output, .. } => format!("result: {}", clip(output)),
            TranscriptEntry::System { text, .. } => format!("system: {}", clip(text)),
        };
        lines.push(format!("- {line}"));
    }
    Some(lines.join("\n"))
}

fn clip(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        s.replace('\n', " ")
    } else {
        let head: String = s.chars().take(MAX).collect();
        format!("{}…", head.replace('\n', " "))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
