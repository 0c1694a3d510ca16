// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk transcripts — one JSON file per agent session under
//! `<cwd>/.corral/transcripts/`.
//!
//! Writes are best-effort: a failed save is logged and never surfaces to
//! the session. Files are human-readable and safe to edit or delete out
//! of band; `list` simply skips anything that no longer parses.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::board::HIDDEN_DIR;
use crate::clock::iso_utc_seconds;

/// One entry in a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User { text: String, timestamp: u64 },
    Assistant { text: String, timestamp: u64 },
    ToolCall { tool: String, call_id: String, input: String, timestamp: u64 },
    ToolResult { call_id: String, output: String, timestamp: u64 },
    System { text: String, timestamp: u64 },
}

/// Versioned on-disk envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptFile {
    pub version: u32,
    pub shell_id: String,
    pub name: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub cwd: String,
    pub transcript: Vec<TranscriptEntry>,
}

/// Listing metadata — everything except the transcript body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMeta {
    pub file: String,
    pub shell_id: String,
    pub name: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub cwd: String,
    pub entry_count: usize,
}

fn transcripts_dir(cwd: &Path) -> PathBuf {
    cwd.join(HIDDEN_DIR).join("transcripts")
}

/// Deterministic file name for a session:
/// `<iso-ts>_<sanitized name>_<shellId>.json` with `:` and `.` replaced
/// by `-` so the name is filesystem-safe everywhere.
pub fn file_name(envelope: &TranscriptFile) -> String {
    let ts: String = iso_utc_seconds(envelope.created_at)
        .chars()
        .map(|c| if c == ':' || c == '.' { '-' } else { c })
        .collect();
    format!("{ts}_{}_{}.json", sanitize(&envelope.name), sanitize(&envelope.shell_id))
}

fn sanitize(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' }).collect()
}

/// Write (or overwrite) the session's transcript file.
///
/// Skipped when the transcript is empty or the cwd is unknown. Failures
/// are logged and swallowed.
pub async fn save(envelope: &TranscriptFile) {
    if envelope.transcript.is_empty() || envelope.cwd.is_empty() {
        return;
    }
    let dir = transcripts_dir(Path::new(&envelope.cwd));
    let path = dir.join(file_name(envelope));
    let result: anyhow::Result<()> = async {
        tokio::fs::create_dir_all(&dir).await?;
        let body = serde_json::to_vec_pretty(envelope)?;
        tokio::fs::write(&path, body).await?;
        Ok(())
    }
    .await;
    if let Err(e) = result {
        warn!(path = %path.display(), "transcript save failed: {e:#}");
    }
}

/// All parseable transcripts under `cwd`, newest first, metadata only.
pub async fn list(cwd: &Path) -> Vec<TranscriptMeta> {
    let dir = transcripts_dir(cwd);
    let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { return Vec::new() };
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file = entry.file_name().to_string_lossy().into_owned();
        if !file.ends_with(".json") {
            continue;
        }
        let Ok(body) = tokio::fs::read_to_string(entry.path()).await else { continue };
        let Ok(envelope) = serde_json::from_str::<TranscriptFile>(&body) else { continue };
        found.push(TranscriptMeta {
            file,
            shell_id: envelope.shell_id,
            name: envelope.name,
            created_at: envelope.created_at,
            updated_at: envelope.updated_at,
            cwd: envelope.cwd,
            entry_count: envelope.transcript.len(),
        });
    }
    found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    found
}

/// Load one transcript by file name. `None` when missing or malformed.
/// File names containing path separators are rejected outright.
pub async fn load(cwd: &Path, file: &str) -> Option<TranscriptFile> {
    if file.contains('/') || file.contains("..") {
        return None;
    }
    let path = transcripts_dir(cwd).join(file);
    let body = tokio::fs::read_to_string(&path).await.ok()?;
    serde_json::from_str(&body).ok()
}

#[cfg(test)]
#[path = "transcript_tests.rs"]
mod tests;
