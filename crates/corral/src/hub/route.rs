// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command routing: resolve one target window, dispatch one frame,
//! await one correlated reply.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::frame::Frame;

use super::correlate::CallReply;
use super::Hub;

/// One routed command.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub channel: String,
    pub action: String,
    pub payload: Value,
    pub timeout: Duration,
    /// Explicit target window, from query param or body field.
    pub window: Option<String>,
    /// Opaque `X-Corral-Session` value, used for affinity.
    pub session: Option<String>,
}

impl Hub {
    /// Route a command to exactly one page and return its reply.
    ///
    /// Failures (no windows, unknown target, timeout, dead peer) come
    /// back as unsuccessful [`CallReply`]s, never as errors — the caller
    /// just serializes whatever it gets.
    pub async fn call(&self, request: CallRequest) -> CallReply {
        let affine = match (&request.window, &request.session) {
            (None, Some(session)) => self.affinity.get(session).await,
            _ => None,
        };

        let target = match self
            .windows
            .resolve_target(request.window.as_deref(), affine.as_deref())
            .await
        {
            Ok(target) => target,
            Err(e) => return CallReply::failure(e.message()),
        };

        let Some(owner) = self.windows.owner_of(&target).await else {
            return CallReply::failure(format!("Window {target} not found"));
        };

        let (id, waiter) = self.pending.issue(&owner, request.timeout).await;

        let mut payload = request.payload;
        super::inject_window_id(&mut payload, &target);
        let frame = Frame {
            id: id.clone(),
            channel: request.channel.clone(),
            action: request.action.clone(),
            payload,
            timestamp: crate::frame::now_ms(),
            source: "agent".to_owned(),
        };

        if !self.peers.send_to(&owner, &frame.to_text()) {
            self.pending.fail(&id, "page connection lost").await;
        }
        debug!(
            channel = %request.channel,
            action = %request.action,
            window = %target,
            "dispatched command"
        );

        let reply = waiter.wait().await;

        // A deliberate explicit target becomes the session's preferred
        // window for future untargeted calls.
        if reply.success {
            if let (Some(window), Some(session)) = (&request.window, &request.session) {
                self.affinity.set(session, window).await;
            }
        }

        reply
    }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
