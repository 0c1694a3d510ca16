// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn envelope(cwd: &str, shell_id: &str, updated_at: u64) -> TranscriptFile {
    TranscriptFile {
        version: 1,
        shell_id: shell_id.to_owned(),
        name: "amber".to_owned(),
        created_at: 1_785_587_405_000,
        updated_at,
        cwd: cwd.to_owned(),
        transcript: vec![
            TranscriptEntry::User { text: "hello".to_owned(), timestamp: 1 },
            TranscriptEntry::Assistant { text: "hi".to_owned(), timestamp: 2 },
        ],
    }
}

#[test]
fn file_name_is_filesystem_safe() {
    let name = file_name(&envelope("/tmp", "shell/../1", 0));
    assert!(!name.contains(':'));
    assert!(!name.contains('/'));
    assert!(name.starts_with("2026-08-01T12-30-05Z_amber_"));
    assert!(name.ends_with(".json"));
}

#[tokio::test]
async fn save_then_list_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().to_string_lossy().into_owned();
    let envelope = envelope(&cwd, "shell-1", 50);

    save(&envelope).await;

    let listed = list(dir.path()).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].shell_id, "shell-1");
    assert_eq!(listed[0].entry_count, 2);

    let loaded = load(dir.path(), &listed[0].file).await.unwrap();
    assert_eq!(loaded.transcript, envelope.transcript);
    assert_eq!(loaded.version, 1);
}

#[tokio::test]
async fn save_skips_empty_transcripts() {
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().to_string_lossy().into_owned();
    let mut empty = envelope(&cwd, "shell-1", 1);
    empty.transcript.clear();

    save(&empty).await;
    assert!(list(dir.path()).await.is_empty());
}

#[tokio::test]
async fn list_skips_malformed_files_and_sorts_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().to_string_lossy().into_owned();

    save(&envelope(&cwd, "old", 10)).await;
    save(&envelope(&cwd, "new", 99)).await;

    let transcripts = dir.path().join(HIDDEN_DIR).join("transcripts");
    std::fs::write(transcripts.join("garbage.json"), "{ nope").unwrap();
    std::fs::write(transcripts.join("notes.txt"), "ignored").unwrap();

    let listed = list(dir.path()).await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].shell_id, "new");
    assert_eq!(listed[1].shell_id, "old");
}

#[tokio::test]
async fn load_rejects_traversal_and_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load(dir.path(), "../../etc/passwd").await.is_none());
    assert!(load(dir.path(), "missing.json").await.is_none());
}

#[tokio::test]
async fn save_failure_is_silent() {
    // cwd points at a file, so creating the directory fails.
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "x").unwrap();
    let envelope = envelope(&blocker.to_string_lossy(), "shell-1", 1);
    // Must not panic or error.
    save(&envelope).await;
}
