// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::transcript::TranscriptEntry;

use super::*;

/// Everything a mock spawn exposes back to the test.
struct SpawnRecord {
    first_message: String,
    stream_tx: mpsc::Sender<ChildStream>,
    stdin_rx: mpsc::Receiver<String>,
}

/// Child backend that never forks: the test drives the output stream and
/// observes stdin injections.
#[derive(Default)]
struct MockBackend {
    spawns: std::sync::Arc<StdMutex<Vec<SpawnRecord>>>,
}

impl MockBackend {
    fn new() -> (Self, std::sync::Arc<StdMutex<Vec<SpawnRecord>>>) {
        let backend = Self::default();
        let spawns = std::sync::Arc::clone(&backend.spawns);
        (backend, spawns)
    }
}

impl ChildBackend for MockBackend {
    fn spawn(
        &self,
        _settings: &ChildSettings,
        _cwd: &std::path::Path,
        first_message: &str,
        stream_tx: mpsc::Sender<ChildStream>,
    ) -> anyhow::Result<ChildHandle> {
        let (stdin_tx, stdin_rx) = mpsc::channel(32);
        if let Ok(mut spawns) = self.spawns.lock() {
            spawns.push(SpawnRecord {
                first_message: first_message.to_owned(),
                stream_tx,
                stdin_rx,
            });
        }
        Ok(ChildHandle::new(None, stdin_tx))
    }
}

fn supervisor() -> (Supervisor, std::sync::Arc<StdMutex<Vec<SpawnRecord>>>) {
    let (backend, spawns) = MockBackend::new();
    (Supervisor::with_backend(ChildSettings::default(), Box::new(backend)), spawns)
}

fn spawn_count(spawns: &std::sync::Arc<StdMutex<Vec<SpawnRecord>>>) -> usize {
    spawns.lock().map(|s| s.len()).unwrap_or(0)
}

fn stream_of(
    spawns: &std::sync::Arc<StdMutex<Vec<SpawnRecord>>>,
    index: usize,
) -> mpsc::Sender<ChildStream> {
    spawns.lock().ok().and_then(|s| s.get(index).map(|r| r.stream_tx.clone())).unwrap()
}

fn first_message_of(
    spawns: &std::sync::Arc<StdMutex<Vec<SpawnRecord>>>,
    index: usize,
) -> String {
    spawns.lock().ok().and_then(|s| s.get(index).map(|r| r.first_message.clone())).unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn prompt_while_idle_spawns_exactly_one_child() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;

    sup.prompt(&session.id, "hello").await.unwrap();
    assert_eq!(spawn_count(&spawns), 1);
    assert_eq!(session.status().await, AgentStatus::Thinking);
}

#[tokio::test]
async fn prompt_while_thinking_injects_instead_of_spawning() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;

    sup.prompt(&session.id, "first").await.unwrap();
    sup.prompt(&session.id, "second").await.unwrap();
    assert_eq!(spawn_count(&spawns), 1, "a running child receives injections");

    // The injection arrived on the child's stdin as a framed user message.
    let line = {
        let mut spawns = spawns.lock().unwrap();
        spawns[0].stdin_rx.try_recv().unwrap()
    };
    let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed["type"], "user");
    assert_eq!(parsed["message"]["content"], "second");
}

#[tokio::test]
async fn child_events_append_exactly_one_transcript_entry_each() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();

    let tx = stream_of(&spawns, 0);
    tx.send(ChildStream::Event(ChildEvent::AssistantText { text: "thinking...".into() }))
        .await
        .unwrap();
    tx.send(ChildStream::Event(ChildEvent::ToolCall {
        tool: "Bash".into(),
        call_id: "t1".into(),
        input: "ls".into(),
    }))
    .await
    .unwrap();
    tx.send(ChildStream::Event(ChildEvent::ToolResult {
        call_id: "t1".into(),
        output: "ok".into(),
    }))
    .await
    .unwrap();
    settle().await;

    let transcript = session.transcript().await;
    // user prompt + three streamed events
    assert_eq!(transcript.len(), 4);
    assert!(matches!(transcript[0], TranscriptEntry::User { .. }));
    assert!(matches!(transcript[1], TranscriptEntry::Assistant { .. }));
    assert!(matches!(transcript[2], TranscriptEntry::ToolCall { .. }));
    assert!(matches!(transcript[3], TranscriptEntry::ToolResult { .. }));
}

#[tokio::test]
async fn clean_exit_returns_to_idle() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();

    let tx = stream_of(&spawns, 0);
    tx.send(ChildStream::Exited(ChildExit { code: 0, stderr: String::new() })).await.unwrap();
    settle().await;
    assert_eq!(session.status().await, AgentStatus::Idle);
}

#[tokio::test]
async fn failed_exit_with_stderr_marks_error_and_preserves_transcript() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();

    let tx = stream_of(&spawns, 0);
    tx.send(ChildStream::Event(ChildEvent::AssistantText { text: "partial".into() }))
        .await
        .unwrap();
    tx.send(ChildStream::Exited(ChildExit { code: 1, stderr: "boom".into() })).await.unwrap();
    settle().await;

    assert_eq!(session.status().await, AgentStatus::Error);
    let transcript = session.transcript().await;
    assert!(transcript.iter().any(|e| matches!(e, TranscriptEntry::Assistant { .. })));

    // A fresh prompt restarts cleanly from the error state.
    sup.prompt(&session.id, "retry").await.unwrap();
    assert_eq!(spawn_count(&spawns), 2);
    assert_eq!(session.status().await, AgentStatus::Thinking);
}

#[tokio::test]
async fn failed_exit_without_stderr_is_just_idle() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();

    let tx = stream_of(&spawns, 0);
    tx.send(ChildStream::Exited(ChildExit { code: 130, stderr: "  ".into() })).await.unwrap();
    settle().await;
    assert_eq!(session.status().await, AgentStatus::Idle);
}

#[tokio::test]
async fn kill_marks_idle_and_next_prompt_is_fresh() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();
    assert!(sup.kill(&session.id).await);
    assert_eq!(session.status().await, AgentStatus::Idle);

    sup.prompt(&session.id, "again").await.unwrap();
    assert_eq!(spawn_count(&spawns), 2);
    // The fresh child got only the new prompt, no residue.
    assert_eq!(first_message_of(&spawns, 1), "again");
}

#[tokio::test]
async fn interrupt_queues_message_and_restart_prepends_it() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "long task").await.unwrap();

    let outcome = sup.interrupt_and_queue(&session.id, "amber", "also consider X").await;
    assert_eq!(outcome, InterruptOutcome::Queued);
    assert_eq!(session.status().await, AgentStatus::Idle);
    assert_eq!(session.queued_messages().await, 1);

    sup.prompt(&session.id, "ok").await.unwrap();
    assert_eq!(spawn_count(&spawns), 2);
    let first = first_message_of(&spawns, 1);
    let envelope_pos = first.find("[message from amber] also consider X").unwrap();
    let prompt_pos = first.rfind("ok").unwrap();
    assert!(envelope_pos < prompt_pos, "queued message precedes prompt: {first}");
    assert_eq!(session.queued_messages().await, 0);
}

#[tokio::test]
async fn interrupt_while_idle_sends_as_prompt() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;

    let outcome = sup.interrupt_and_queue(&session.id, "amber", "do this").await;
    assert_eq!(outcome, InterruptOutcome::Sent);
    assert_eq!(spawn_count(&spawns), 1);
    assert!(first_message_of(&spawns, 0).contains("do this"));
    assert_eq!(session.queued_messages().await, 0);
}

#[tokio::test]
async fn interrupt_unknown_session_not_found() {
    let (sup, _spawns) = supervisor();
    assert_eq!(
        sup.interrupt_and_queue("ghost", "x", "y").await,
        InterruptOutcome::NotFound
    );
}

#[tokio::test]
async fn deliver_or_queue_pastes_into_running_child() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();

    assert!(sup.deliver_or_queue(&session.id, "basil", "heads up").await);
    let line = {
        let mut spawns = spawns.lock().unwrap();
        spawns[0].stdin_rx.try_recv().unwrap()
    };
    assert!(line.contains("[message from basil] heads up"));
    assert_eq!(session.queued_messages().await, 0);
}

#[tokio::test]
async fn send_to_child_injects_without_status_change() {
    let (sup, spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();

    assert!(sup.send_to_child(&session.id, "raw injection").await);
    let line = {
        let mut spawns = spawns.lock().unwrap();
        spawns[0].stdin_rx.try_recv().unwrap()
    };
    assert!(line.contains("raw injection"));
    assert_eq!(session.status().await, AgentStatus::Thinking);

    // No running child: nothing to write into.
    sup.kill(&session.id).await;
    assert!(!sup.send_to_child(&session.id, "dropped").await);
}

#[tokio::test]
async fn deliver_or_queue_parks_when_idle() {
    let (sup, _spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    assert!(sup.deliver_or_queue(&session.id, "basil", "later").await);
    assert_eq!(session.queued_messages().await, 1);
}

#[tokio::test]
async fn names_are_unique_among_live_sessions() {
    let (sup, _spawns) = supervisor();
    let mut names = std::collections::HashSet::new();
    for _ in 0..NAME_POOL.len() + 3 {
        let session = sup.register(PathBuf::from("/tmp")).await;
        assert!(names.insert(session.name().await), "duplicate live name");
    }
}

#[tokio::test]
async fn restore_starts_empty_and_context_is_consumed_once() {
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().to_string_lossy().into_owned();
    let saved = crate::transcript::TranscriptFile {
        version: 1,
        shell_id: "old-shell".to_owned(),
        name: "garnet".to_owned(),
        created_at: 1_000,
        updated_at: 2_000,
        cwd: cwd.clone(),
        transcript: vec![
            TranscriptEntry::User { text: "build the parser".to_owned(), timestamp: 1 },
            TranscriptEntry::Assistant { text: "done, see parse.rs".to_owned(), timestamp: 2 },
        ],
    };
    crate::transcript::save(&saved).await;
    let file = crate::transcript::list(dir.path()).await[0].file.clone();

    let (sup, spawns) = supervisor();
    let session = sup.restore(dir.path(), &file).await.unwrap();
    assert_eq!(session.name().await, "garnet");
    assert!(session.transcript().await.is_empty(), "restore starts fresh");
    assert!(session.restored_context().await.is_some());

    sup.prompt(&session.id, "continue").await.unwrap();
    let first = first_message_of(&spawns, 0);
    assert!(first.contains("build the parser"), "context prepended: {first}");
    assert!(first.ends_with("continue"));

    // Second prompt: context must not reappear.
    let tx = stream_of(&spawns, 0);
    tx.send(ChildStream::Exited(ChildExit { code: 0, stderr: String::new() })).await.unwrap();
    settle().await;
    sup.prompt(&session.id, "next").await.unwrap();
    assert_eq!(first_message_of(&spawns, 1), "next");
}

#[tokio::test]
async fn status_events_are_broadcast() {
    let (sup, _spawns) = supervisor();
    let mut rx = sup.subscribe();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();

    let event = rx.recv().await.unwrap();
    match event {
        AgentEvent::Status { session_id, status, .. } => {
            assert_eq!(session_id, session.id);
            assert_eq!(status, AgentStatus::Thinking);
        }
        other => panic!("expected status event, got {other:?}"),
    }
}

#[tokio::test]
async fn remove_interrupts_and_forgets() {
    let (sup, _spawns) = supervisor();
    let session = sup.register(PathBuf::from("/tmp")).await;
    sup.prompt(&session.id, "go").await.unwrap();
    assert!(sup.remove(&session.id).await);
    assert!(sup.get(&session.id).await.is_none());
    assert!(!sup.remove(&session.id).await);
}
