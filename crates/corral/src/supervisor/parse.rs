// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Classification of the child's line-delimited JSON output stream.

use serde_json::Value;

/// Maximum length for a non-JSON line to still count as text output.
const MAX_TEXT_LINE: usize = 1000;

/// Typed events extracted from one stdout line. A single assistant frame
/// can yield several events (one per content block).
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    AssistantText { text: String },
    ToolCall { tool: String, call_id: String, input: String },
    ToolResult { call_id: String, output: String },
    /// Terminal result frame; the stream usually ends shortly after.
    Completed { cost_usd: Option<f64>, duration_ms: Option<u64> },
    /// Short non-JSON line passed through as generic text.
    Text { text: String },
}

/// Parse one line of child stdout into zero or more events.
///
/// The init/system frame is ignored. Non-JSON lines that look like HTML
/// or base64, or are implausibly long, are dropped as garbage.
pub fn parse_line(line: &str) -> Vec<ChildEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    let Ok(json) = serde_json::from_str::<Value>(line) else {
        if looks_like_garbage(line) {
            return Vec::new();
        }
        return vec![ChildEvent::Text { text: line.to_owned() }];
    };

    match json.get("type").and_then(Value::as_str) {
        Some("system") => Vec::new(),
        Some("assistant") | Some("user") => content_blocks(&json),
        Some("result") => vec![ChildEvent::Completed {
            cost_usd: json.get("total_cost_usd").and_then(Value::as_f64),
            duration_ms: json.get("duration_ms").and_then(Value::as_u64),
        }],
        _ => Vec::new(),
    }
}

/// Walk `message.content` and emit one event per recognised block.
fn content_blocks(json: &Value) -> Vec<ChildEvent> {
    let Some(content) =
        json.get("message").and_then(|m| m.get("content")).and_then(Value::as_array)
    else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for (index, block) in content.iter().enumerate() {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    events.push(ChildEvent::AssistantText { text: text.to_owned() });
                }
            }
            Some("tool_use") => {
                let tool =
                    block.get("name").and_then(Value::as_str).unwrap_or("unknown").to_owned();
                let call_id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{tool}-{index}"));
                events.push(ChildEvent::ToolCall {
                    tool,
                    call_id,
                    input: normalize_tool_input(block.get("input")),
                });
            }
            Some("tool_result") => {
                let call_id = block
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_owned();
                events.push(ChildEvent::ToolResult {
                    call_id,
                    output: stringify_block_content(block.get("content")),
                });
            }
            _ => {}
        }
    }
    events
}

/// Tool input may be a plain string or a structured value; structured
/// input is serialized deterministically (serde_json orders object keys).
pub fn normalize_tool_input(input: Option<&Value>) -> String {
    match input {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Tool-result content is either a string or a block array; flatten the
/// text blocks, fall back to raw serialization.
fn stringify_block_content(content: Option<&Value>) -> String {
    match content {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                serde_json::to_string(content.unwrap_or(&Value::Null)).unwrap_or_default()
            } else {
                texts.join("\n")
            }
        }
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn looks_like_garbage(line: &str) -> bool {
    if line.len() > MAX_TEXT_LINE {
        return true;
    }
    if line.starts_with('<') {
        return true;
    }
    // Long runs of pure base64 alphabet are binary junk, not prose.
    line.len() >= 120
        && line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
