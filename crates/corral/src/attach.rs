// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `corral attach` — a line-oriented terminal client.
//!
//! Connects to the server's terminal mount, registers a shell identity,
//! and mirrors the shared status line, push notices, DMs, and agent
//! events to stdout. Stdin lines become terminal commands:
//!
//! - `@name some text` sends a DM
//! - `/status` asks for the current line
//! - anything else runs as a task-board command (`list`, `add "x"`, ...)

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::Message;

use crate::frame::{Frame, Incoming};

#[derive(Debug, Parser)]
pub struct AttachArgs {
    /// Server host.
    #[arg(long, env = "CORRAL_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port.
    #[arg(long, env = "CORRAL_PORT", default_value = "4670")]
    pub port: u16,
}

/// Run the attach client; returns the process exit code.
pub async fn run(args: AttachArgs) -> i32 {
    match attach(&args).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("attach: {e:#}");
            1
        }
    }
}

async fn attach(args: &AttachArgs) -> anyhow::Result<()> {
    let url = format!("ws://{}:{}/ws/terminal?register=true", args.host, args.port);
    let (stream, _) = tokio_tungstenite::connect_async(&url).await?;
    let (mut ws_tx, mut ws_rx) = stream.split();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => anyhow::bail!("connection error: {e}"),
                    None => break,
                };
                if let Message::Text(text) = message {
                    print_incoming(text.as_str());
                }
            }
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let frame = command_frame(line);
                ws_tx.send(Message::Text(frame.to_text().into())).await?;
            }
        }
    }
    Ok(())
}

/// Turn one stdin line into a terminal command frame.
fn command_frame(line: &str) -> Frame {
    if let Some(rest) = line.strip_prefix('@') {
        let (to, text) = rest.split_once(' ').unwrap_or((rest, ""));
        return Frame::new("terminal", "dm", json!({ "to": to, "text": text }), "terminal");
    }
    if line == "/status" {
        return Frame::new("terminal", "status", json!({}), "terminal");
    }
    Frame::new("terminal", "tasks", json!({ "command": line }), "terminal")
}

/// Render one server message for the console.
fn print_incoming(text: &str) {
    let Ok(incoming) = Incoming::parse(text) else { return };
    match incoming {
        Incoming::Frame(frame) => match frame.action.as_str() {
            "status" => {
                if let Some(line) = frame.payload.get("line").and_then(Value::as_str) {
                    println!("[status] {line}");
                }
            }
            "push" => {
                let tool = frame.payload.get("tool").and_then(Value::as_str).unwrap_or("?");
                let text = frame.payload.get("text").and_then(Value::as_str).unwrap_or("");
                println!("[{tool}] {text}");
            }
            "dm" => {
                let from = frame.payload.get("from").and_then(Value::as_str).unwrap_or("?");
                let text = frame.payload.get("text").and_then(Value::as_str).unwrap_or("");
                println!("[dm from {from}] {text}");
            }
            "shell-registered" => {
                let name = frame.payload.get("name").and_then(Value::as_str).unwrap_or("?");
                println!("attached as {name}");
            }
            "shell-departed" => {
                let shell = frame.payload.get("shellId").and_then(Value::as_str).unwrap_or("?");
                println!("[departed] {shell}");
            }
            action if action.starts_with("agent-") => {
                println!("[{action}] {}", frame.payload);
            }
            _ => {}
        },
        Incoming::Reply(reply) => {
            if reply.success {
                match reply.data {
                    Some(data) => println!("{data}"),
                    None => println!("ok"),
                }
            } else {
                println!("error: {}", reply.error.unwrap_or_default());
            }
        }
    }
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
