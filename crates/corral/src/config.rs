// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

use crate::supervisor::ChildSettings;

/// Localhost control-plane broker for browser-driving AI agents.
#[derive(Debug, Clone, Parser)]
#[command(name = "corral", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "CORRAL_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP/WebSocket port to listen on.
    #[arg(long, env = "CORRAL_PORT", default_value = "4670")]
    pub port: u16,

    /// Project directory holding .corral/ (defaults to the cwd).
    #[arg(long, env = "CORRAL_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    /// Assistant CLI the supervisor spawns.
    #[arg(long, env = "CORRAL_AGENT_COMMAND", default_value = "claude")]
    pub agent_command: String,

    /// Tools the assistant child may use.
    #[arg(
        long,
        env = "CORRAL_ALLOWED_TOOLS",
        value_delimiter = ',',
        default_values_t = ["Bash".to_owned(), "Read".to_owned(), "Write".to_owned()]
    )]
    pub allowed_tools: Vec<String>,

    /// Default per-call timeout for routed page commands, in ms.
    #[arg(long, env = "CORRAL_CALL_TIMEOUT_MS", default_value = "5000")]
    pub call_timeout_ms: u64,

    /// Log format (json or text).
    #[arg(long, env = "CORRAL_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CORRAL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("--host must not be empty");
        }
        if self.call_timeout_ms == 0 {
            anyhow::bail!("--call-timeout-ms must be positive");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("unknown log format {other:?} (expected json or text)"),
        }
        Ok(())
    }

    /// Project directory, falling back to the process cwd.
    pub fn resolved_project_dir(&self) -> PathBuf {
        self.project_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn child_settings(&self) -> ChildSettings {
        ChildSettings {
            command: self.agent_command.clone(),
            allowed_tools: self.allowed_tools.clone(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
