// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared task board — a markdown Kanban file every peer can read and
//! edit, in or out of band.
//!
//! The file is the source of truth: every command re-reads it before
//! applying, then rewrites the full serialization. Last writer wins at
//! the file level. Ids are dense per parse and stable only within one
//! load, which keeps the file free of bookkeeping noise.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::clock::{iso_utc_seconds, now_ms};

/// Hidden per-project directory corral keeps its state in.
pub const HIDDEN_DIR: &str = ".corral";

/// Board columns in canonical file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Icebox,
    Queued,
    InProgress,
    Blocked,
    Review,
    Done,
    Trash,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Icebox,
        Column::Queued,
        Column::InProgress,
        Column::Blocked,
        Column::Review,
        Column::Done,
        Column::Trash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Icebox => "icebox",
            Column::Queued => "queued",
            Column::InProgress => "in_progress",
            Column::Blocked => "blocked",
            Column::Review => "review",
            Column::Done => "done",
            Column::Trash => "trash",
        }
    }

    pub fn parse(s: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// Done and trash items are hidden from the default listing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Column::Done | Column::Trash)
    }
}

/// One task line plus its metadata bullets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskItem {
    pub id: usize,
    pub title: String,
    pub column: Column,
    pub metadata: IndexMap<String, String>,
}

/// Parse a board file into its item sequence. Unknown headings start an
/// ignored section; metadata bullets with no preceding task are dropped.
pub fn parse_board(content: &str) -> Vec<TaskItem> {
    let mut items: Vec<TaskItem> = Vec::new();
    let mut column: Option<Column> = None;
    for raw in content.lines() {
        let line = raw.trim_end();
        if let Some(heading) = line.strip_prefix('#') {
            column = Column::parse(heading.trim());
            continue;
        }
        let Some(col) = column else { continue };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(bullet) = line.trim_start().strip_prefix("- ") {
            if let Some((key, value)) = bullet.split_once(':') {
                if let Some(last) = items.last_mut() {
                    if last.column == col {
                        last.metadata
                            .insert(key.trim().to_owned(), value.trim().to_owned());
                    }
                }
            }
            continue;
        }
        items.push(TaskItem {
            id: items.len() + 1,
            title: line.trim().to_owned(),
            column: col,
            metadata: IndexMap::new(),
        });
    }
    items
}

/// Serialize items back to the canonical file layout.
pub fn serialize_board(items: &[TaskItem]) -> String {
    let mut out = String::new();
    for column in Column::ALL {
        let tasks: Vec<&TaskItem> = items.iter().filter(|t| t.column == column).collect();
        if tasks.is_empty() {
            continue;
        }
        out.push_str(&format!("# {}\n\n", column.as_str()));
        for task in tasks {
            out.push_str(&task.title);
            out.push('\n');
            for (key, value) in &task.metadata {
                out.push_str(&format!("- {key}: {value}\n"));
            }
            out.push('\n');
        }
    }
    out
}

/// One-line board digest for the shared status line.
pub fn summary_line(items: &[TaskItem]) -> String {
    if items.is_empty() {
        return "empty".to_owned();
    }
    let count = |col: Column| items.iter().filter(|t| t.column == col).count();
    let mut parts = Vec::new();
    for (column, label) in [
        (Column::InProgress, "active"),
        (Column::Blocked, "blocked"),
        (Column::Review, "review"),
        (Column::Queued, "queued"),
    ] {
        let n = count(column);
        if n > 0 {
            parts.push(format!("{n} {label}"));
        }
    }
    if parts.is_empty() {
        "empty".to_owned()
    } else {
        parts.join(", ")
    }
}

/// A parsed board command. First token is the verb; titles and reasons
/// are double-quoted.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardCommand {
    List { column: Option<Column> },
    Add { title: String, column: Column },
    Move { id: usize, column: Column, reason: Option<String> },
    Claim { id: usize },
    Block { id: usize, reason: String },
    Done { id: usize },
    Trash { id: usize },
    Detail { id: usize },
    Board,
}

impl BoardCommand {
    /// Parse a command string. Errors carry the expected shape so callers
    /// can surface a usable validation message.
    pub fn parse(input: &str) -> Result<BoardCommand, String> {
        let tokens = tokenize(input);
        let mut tokens = tokens.iter().map(String::as_str);
        let verb = tokens.next().ok_or("expected: <verb> ...")?;
        match verb {
            "list" => {
                let column = match tokens.next() {
                    Some(name) => {
                        Some(Column::parse(name).ok_or_else(|| unknown_column(name))?)
                    }
                    None => None,
                };
                Ok(BoardCommand::List { column })
            }
            "add" => {
                let title = tokens.next().ok_or("expected: add \"title\" [column]")?;
                let column = match tokens.next() {
                    Some(name) => Column::parse(name).ok_or_else(|| unknown_column(name))?,
                    None => Column::Queued,
                };
                Ok(BoardCommand::Add { title: title.to_owned(), column })
            }
            "move" => {
                let id = parse_id(tokens.next(), "move <id> <column> [\"reason\"]")?;
                let name = tokens.next().ok_or("expected: move <id> <column> [\"reason\"]")?;
                let column = Column::parse(name).ok_or_else(|| unknown_column(name))?;
                let reason = tokens.next().map(str::to_owned);
                Ok(BoardCommand::Move { id, column, reason })
            }
            "claim" => Ok(BoardCommand::Claim { id: parse_id(tokens.next(), "claim <id>")? }),
            "block" => {
                let id = parse_id(tokens.next(), "block <id> \"reason\"")?;
                let reason = tokens.next().ok_or("expected: block <id> \"reason\"")?;
                Ok(BoardCommand::Block { id, reason: reason.to_owned() })
            }
            "done" => Ok(BoardCommand::Done { id: parse_id(tokens.next(), "done <id>")? }),
            "trash" => Ok(BoardCommand::Trash { id: parse_id(tokens.next(), "trash <id>")? }),
            "detail" => Ok(BoardCommand::Detail { id: parse_id(tokens.next(), "detail <id>")? }),
            "board" => Ok(BoardCommand::Board),
            other => Err(format!(
                "unknown verb {other:?}; expected one of: list add move claim block done trash detail board"
            )),
        }
    }
}

fn unknown_column(name: &str) -> String {
    format!("unknown column {name:?}; expected one of: icebox queued in_progress blocked review done trash")
}

fn parse_id(token: Option<&str>, shape: &str) -> Result<usize, String> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| format!("expected: {shape}"))
}

/// Split a command line into tokens, honouring double quotes.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in input.chars() {
        match ch {
            '"' => {
                if in_quotes {
                    tokens.push(std::mem::take(&mut current));
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Result of a board command, ready for JSON rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BoardReply {
    Items(Vec<TaskItem>),
    Item(TaskItem),
    Rendered(serde_json::Value),
}

/// File-backed board. Holds only the project directory; all state lives
/// in the file so out-of-band edits are picked up on the next command.
pub struct TaskBoard {
    dir: PathBuf,
}

impl TaskBoard {
    /// `project_dir` is the directory whose `.corral/` holds the board.
    pub fn new(project_dir: &Path) -> Self {
        Self { dir: project_dir.join(HIDDEN_DIR) }
    }

    /// First existing `tasks-<hex>.md`, or a freshly named one.
    async fn board_path(&self) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut found: Vec<PathBuf> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("tasks-") && name.ends_with(".md") {
                found.push(entry.path());
            }
        }
        found.sort();
        if let Some(path) = found.into_iter().next() {
            return Ok(path);
        }
        let suffix: u32 = rand::random();
        Ok(self.dir.join(format!("tasks-{suffix:08x}.md")))
    }

    /// Current item sequence. A missing or unparseable file is an empty
    /// board; the next mutation rewrites it.
    pub async fn load(&self) -> Vec<TaskItem> {
        let Ok(path) = self.board_path().await else { return Vec::new() };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse_board(&content),
            Err(_) => Vec::new(),
        }
    }

    async fn store(&self, items: &[TaskItem]) -> anyhow::Result<()> {
        let path = self.board_path().await?;
        tokio::fs::write(&path, serialize_board(items)).await?;
        Ok(())
    }

    /// Execute one command. `caller` is the shell name recorded by
    /// `claim`. Mutations re-read the file first, then write it whole.
    pub async fn execute(
        &self,
        command: BoardCommand,
        caller: &str,
    ) -> Result<BoardReply, String> {
        let mut items = self.load().await;
        let reply = match command {
            BoardCommand::List { column } => {
                let listed: Vec<TaskItem> = items
                    .iter()
                    .filter(|t| match column {
                        Some(col) => t.column == col,
                        None => !t.column.is_terminal(),
                    })
                    .cloned()
                    .collect();
                return Ok(BoardReply::Items(listed));
            }
            BoardCommand::Board => {
                let mut rendered = serde_json::Map::new();
                for column in Column::ALL {
                    let tasks: Vec<&TaskItem> =
                        items.iter().filter(|t| t.column == column).collect();
                    rendered.insert(column.as_str().to_owned(), json!(tasks));
                }
                return Ok(BoardReply::Rendered(serde_json::Value::Object(rendered)));
            }
            BoardCommand::Detail { id } => {
                let item = find_item(&items, id)?;
                return Ok(BoardReply::Item(item.clone()));
            }
            BoardCommand::Add { title, column } => {
                let item = TaskItem {
                    id: items.len() + 1,
                    title,
                    column,
                    metadata: IndexMap::new(),
                };
                items.push(item.clone());
                BoardReply::Item(item)
            }
            BoardCommand::Move { id, column, reason } => {
                let item = find_item_mut(&mut items, id)?;
                item.column = column;
                if let Some(reason) = reason {
                    item.metadata.insert("reason".to_owned(), reason);
                }
                BoardReply::Item(item.clone())
            }
            BoardCommand::Claim { id } => {
                let now = iso_utc_seconds(now_ms());
                let item = find_item_mut(&mut items, id)?;
                item.column = Column::InProgress;
                item.metadata.insert("claimed".to_owned(), caller.to_owned());
                item.metadata.insert("started".to_owned(), now);
                BoardReply::Item(item.clone())
            }
            BoardCommand::Block { id, reason } => {
                let item = find_item_mut(&mut items, id)?;
                item.column = Column::Blocked;
                item.metadata.insert("reason".to_owned(), reason);
                BoardReply::Item(item.clone())
            }
            BoardCommand::Done { id } => {
                let now = iso_utc_seconds(now_ms());
                let item = find_item_mut(&mut items, id)?;
                item.column = Column::Done;
                item.metadata.insert("completed".to_owned(), now);
                BoardReply::Item(item.clone())
            }
            BoardCommand::Trash { id } => {
                let item = find_item_mut(&mut items, id)?;
                item.column = Column::Trash;
                BoardReply::Item(item.clone())
            }
        };
        if let Err(e) = self.store(&items).await {
            warn!("task board write failed: {e:#}");
            return Err("board write failed".to_owned());
        }
        Ok(reply)
    }

    /// Board digest for the status line.
    pub async fn summary(&self) -> String {
        summary_line(&self.load().await)
    }
}

fn find_item(items: &[TaskItem], id: usize) -> Result<&TaskItem, String> {
    items.iter().find(|t| t.id == id).ok_or_else(|| format!("no task with id {id}"))
}

fn find_item_mut(items: &mut [TaskItem], id: usize) -> Result<&mut TaskItem, String> {
    items.iter_mut().find(|t| t.id == id).ok_or_else(|| format!("no task with id {id}"))
}

#[cfg(test)]
#[path = "board_tests.rs"]
mod tests;
