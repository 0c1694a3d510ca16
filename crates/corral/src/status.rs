// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared status line and push notices for terminal observers.
//!
//! Each tool contributes one short string; the aggregator joins the
//! non-empty items into a single line and broadcasts a `status` frame to
//! every terminal peer whenever anything changes.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};

use crate::clock::now_ms;
use crate::frame::Frame;
use crate::hub::window::WindowInfo;

/// Status item shown when no window is connected.
pub const NO_BROWSER_STATUS: &str = "no browser connected";

/// Title truncation length in the browser status item.
const TITLE_MAX: usize = 40;

/// A one-shot notice pushed at terminals.
#[derive(Debug, Clone, Serialize)]
pub struct PushNotice {
    pub tool: String,
    pub text: String,
    pub timestamp: u64,
}

struct StatusInner {
    items: IndexMap<String, String>,
    notices: Vec<PushNotice>,
}

/// Aggregated per-tool status plus the notice queue.
pub struct StatusState {
    inner: RwLock<StatusInner>,
    /// Fires a `status` frame on every change; terminal connections
    /// subscribe and forward.
    tx: broadcast::Sender<Frame>,
}

impl StatusState {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { inner: RwLock::new(StatusInner { items: IndexMap::new(), notices: Vec::new() }), tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    /// Set (or clear, with an empty value) one tool's status item.
    pub async fn update(&self, tool: &str, value: &str) {
        let line = {
            let mut inner = self.inner.write().await;
            if value.is_empty() {
                inner.items.shift_remove(tool);
            } else {
                inner.items.insert(tool.to_owned(), value.to_owned());
            }
            render_line(&inner.items)
        };
        let _ = self.tx.send(Frame::system("status", json!({ "line": line })));
    }

    /// Append a push notice and broadcast it.
    pub async fn push(&self, tool: &str, text: &str) {
        let notice =
            PushNotice { tool: tool.to_owned(), text: text.to_owned(), timestamp: now_ms() };
        self.inner.write().await.notices.push(notice.clone());
        let _ = self.tx.send(Frame::system(
            "push",
            json!({ "tool": notice.tool, "text": notice.text, "timestamp": notice.timestamp }),
        ));
    }

    /// The compact single-line rendering of all non-empty items.
    pub async fn status_line(&self) -> String {
        render_line(&self.inner.read().await.items)
    }

    /// Drain and return queued notices.
    pub async fn take_notices(&self) -> Vec<PushNotice> {
        std::mem::take(&mut self.inner.write().await.notices)
    }

    /// Recompute the browser item from the current window table view.
    /// Called whenever a window connects, disconnects, or focus moves.
    pub async fn set_browser_status(&self, focused: Option<&WindowInfo>, window_count: usize) {
        let value = match focused {
            Some(window) => {
                let host = host_of(&window.url);
                let title = truncate(&window.title, TITLE_MAX);
                if title.is_empty() {
                    host
                } else {
                    format!("{host} ({title})")
                }
            }
            None if window_count > 0 => format!("{window_count} tabs"),
            None => NO_BROWSER_STATUS.to_owned(),
        };
        self.update("browser", &value).await;
    }
}

impl Default for StatusState {
    fn default() -> Self {
        Self::new()
    }
}

fn render_line(items: &IndexMap<String, String>) -> String {
    items
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}…")
    }
}

/// Hostname (and port, if any) of a URL, without scheme or path.
fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#']).next().unwrap_or_default().to_owned()
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
