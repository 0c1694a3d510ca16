// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the framed-JSON channel.
//!
//! Every transport message is one JSON object. Commands and events travel
//! as [`Frame`]s (`{id, channel, action, payload, timestamp, source}`);
//! replies travel as [`Reply`]s carrying the original `id`. Only frames on
//! the `system` channel are interpreted by the core — everything else is
//! routed opaquely.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::clock::now_ms;

/// Channel name reserved for frames the core interprets.
pub const SYSTEM_CHANNEL: &str = "system";

/// A command or event frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: String,
    pub channel: String,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// A reply to a previously sent frame, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: u64,
}

/// Anything a peer may send on its duplex channel.
#[derive(Debug, Clone)]
pub enum Incoming {
    Frame(Frame),
    Reply(Reply),
}

impl Frame {
    /// Build an outbound frame with a fresh id and current timestamp.
    pub fn new(channel: &str, action: &str, payload: Value, source: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: channel.to_owned(),
            action: action.to_owned(),
            payload,
            timestamp: now_ms(),
            source: source.to_owned(),
        }
    }

    /// Build a system frame originating from the server.
    pub fn system(action: &str, payload: Value) -> Self {
        Self::new(SYSTEM_CHANNEL, action, payload, "server")
    }

    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }

    /// Serialize for the wire. Falls back to an empty object on the
    /// (unreachable) serialization failure so senders never panic.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

impl Reply {
    pub fn ok(id: &str, data: Value) -> Self {
        Self {
            id: id.to_owned(),
            success: true,
            data: Some(data),
            error: None,
            timestamp: now_ms(),
        }
    }

    pub fn err(id: &str, error: &str) -> Self {
        Self {
            id: id.to_owned(),
            success: false,
            data: None,
            error: Some(error.to_owned()),
            timestamp: now_ms(),
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

impl Incoming {
    /// Parse one transport message.
    ///
    /// A reply is recognised by its `success` field; anything else must
    /// deserialize as a [`Frame`].
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("success").is_some() && value.get("action").is_none() {
            return Ok(Self::Reply(serde_json::from_value(value)?));
        }
        Ok(Self::Frame(serde_json::from_value(value)?))
    }
}

/// Window kind declared by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[default]
    Tab,
    Popup,
    Iframe,
}

/// Identity payload sent by a page immediately after connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub window_id: String,
    pub page_instance_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub window_type: WindowType,
    /// What the page believes the server's session id is. A mismatch
    /// triggers a `reload` nudge so the page re-bootstraps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_session_id: Option<String>,
}

fn default_active() -> bool {
    true
}

/// The closed set of system frames the core interprets.
///
/// Anything on the system channel that doesn't match is ignored (logged by
/// the caller); anything off the system channel is never parsed here.
#[derive(Debug, Clone)]
pub enum SystemFrame {
    Identity(Identity),
    WindowUpdated {
        url: Option<String>,
        title: Option<String>,
        active: Option<bool>,
        label: Option<String>,
    },
    Activate,
    Deactivate,
    Focus {
        window_id: String,
    },
}

impl SystemFrame {
    /// Interpret a frame on the system channel.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if !frame.is_system() {
            return None;
        }
        match frame.action.as_str() {
            "identity" => {
                let identity: Identity = serde_json::from_value(frame.payload.clone()).ok()?;
                Some(Self::Identity(identity))
            }
            "window-updated" => Some(Self::WindowUpdated {
                url: str_field(&frame.payload, "url"),
                title: str_field(&frame.payload, "title"),
                active: frame.payload.get("active").and_then(Value::as_bool),
                label: str_field(&frame.payload, "label"),
            }),
            "activate" => Some(Self::Activate),
            "deactivate" => Some(Self::Deactivate),
            "focus" => Some(Self::Focus { window_id: str_field(&frame.payload, "windowId")? }),
            _ => None,
        }
    }
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
