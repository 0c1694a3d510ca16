// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assistant child process: spawn, framed stdin, streamed stdout.
//!
//! One task owns the reader; the session owner talks to the child only
//! through [`ChildHandle`]. Interrupts are a SIGINT plus a local state
//! change — the supervisor never waits for the child to die.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::parse::{parse_line, ChildEvent};

/// How the assistant child is launched.
#[derive(Debug, Clone)]
pub struct ChildSettings {
    /// Executable name or path (the assistant CLI).
    pub command: String,
    /// Tools the child is allowed to use.
    pub allowed_tools: Vec<String>,
}

impl Default for ChildSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_owned(),
            allowed_tools: vec!["Bash".to_owned(), "Read".to_owned(), "Write".to_owned()],
        }
    }
}

/// Everything the pump task receives from a running child.
#[derive(Debug)]
pub enum ChildStream {
    Event(ChildEvent),
    Exited(ChildExit),
}

/// Terminal state of a child process.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildExit {
    pub code: i32,
    /// Captured stderr, surfaced only when the exit code is non-zero.
    pub stderr: String,
}

/// Live handle kept by the session while a child runs.
pub struct ChildHandle {
    pid: Option<u32>,
    stdin_tx: mpsc::Sender<String>,
}

impl ChildHandle {
    /// Assemble a handle around an existing stdin channel. Mock backends
    /// use this; `pid: None` makes `interrupt` a no-op.
    pub fn new(pid: Option<u32>, stdin_tx: mpsc::Sender<String>) -> Self {
        Self { pid, stdin_tx }
    }

    /// Write one framed user message to the child's stdin.
    pub fn send_user_message(&self, content: &str) -> bool {
        let frame = json!({
            "type": "user",
            "message": { "role": "user", "content": content },
        });
        let line = serde_json::to_string(&frame).unwrap_or_default();
        self.stdin_tx.try_send(line).is_ok()
    }

    /// Graceful stop. The child treats SIGINT as a clean cancellation;
    /// the OS escalates if it ignores us.
    pub fn interrupt(&self) {
        if let Some(pid) = self.pid {
            if let Ok(pid) = i32::try_from(pid) {
                if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGINT) {
                    debug!("interrupt signal failed: {e}");
                }
            }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Spawn the assistant child and deliver its parsed output on a channel.
///
/// `first_message` is written to stdin immediately; stdin stays open for
/// mid-flight injection through the returned handle.
pub fn spawn(
    settings: &ChildSettings,
    cwd: &Path,
    first_message: &str,
    stream_tx: mpsc::Sender<ChildStream>,
) -> anyhow::Result<ChildHandle> {
    let mut command = Command::new(&settings.command);
    command
        .arg("--print")
        .arg("--input-format")
        .arg("stream-json")
        .arg("--output-format")
        .arg("stream-json")
        .arg("--permission-mode")
        .arg("bypassPermissions")
        .arg("--add-dir")
        .arg(cwd)
        .current_dir(cwd)
        .env("PATH", augmented_path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);
    if !settings.allowed_tools.is_empty() {
        command.arg("--allowed-tools").arg(settings.allowed_tools.join(","));
    }

    let mut child = command.spawn()?;
    let pid = child.id();

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Writer task: owns stdin, drains the injection channel.
    let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let Some(mut stdin) = stdin else { return };
        while let Some(line) = stdin_rx.recv().await {
            if stdin.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdin.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdin.flush().await;
        }
    });

    let handle = ChildHandle { pid, stdin_tx };
    if !handle.send_user_message(first_message) {
        warn!("child stdin closed before first message");
    }

    // Reader task: owns stdout and stderr, forwards parsed events, then
    // reports the exit status.
    tokio::spawn(async move {
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf).await;
            }
            buf
        });

        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                for event in parse_line(&line) {
                    if stream_tx.send(ChildStream::Event(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        let code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(_) => -1,
        };
        let stderr = stderr_task.await.unwrap_or_default();
        let _ = stream_tx.send(ChildStream::Exited(ChildExit { code, stderr })).await;
    });

    Ok(handle)
}

/// Child PATH: the server's own directory first, so the child can find
/// the sidecar CLI, then the inherited search path.
fn augmented_path() -> String {
    let inherited = std::env::var("PATH").unwrap_or_default();
    let own_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from));
    match own_dir {
        Some(dir) => format!("{}:{inherited}", dir.display()),
        None => inherited,
    }
}
