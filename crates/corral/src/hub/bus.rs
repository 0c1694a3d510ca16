// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-observer fan-out with a bounded replay ring.
//!
//! Every non-system frame is broadcast to all attached observers and
//! pushed into a FIFO ring so a late-attaching observer can catch up.
//! Publication and attachment both run under the ring lock, so an
//! attaching observer can neither miss a frame nor receive one twice.

use std::collections::VecDeque;

use tokio::sync::{broadcast, Mutex};

use crate::frame::Frame;

/// Maximum frames retained for replay.
pub const REPLAY_CAP: usize = 100;

struct BusInner {
    ring: VecDeque<String>,
    tx: broadcast::Sender<String>,
}

pub struct BusState {
    inner: Mutex<BusInner>,
}

impl BusState {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(REPLAY_CAP * 2);
        Self { inner: Mutex::new(BusInner { ring: VecDeque::with_capacity(REPLAY_CAP), tx }) }
    }

    /// Fan a frame out to live observers and remember it for replay.
    /// System frames are never buffered or fanned out here.
    pub async fn publish(&self, frame: &Frame) {
        if frame.is_system() {
            return;
        }
        let text = frame.to_text();
        let mut inner = self.inner.lock().await;
        if inner.ring.len() == REPLAY_CAP {
            inner.ring.pop_front();
        }
        inner.ring.push_back(text.clone());
        let _ = inner.tx.send(text);
    }

    /// Attach a new observer: the current ring contents (in order) plus a
    /// live subscription beginning at the first frame after the snapshot.
    pub async fn attach(&self) -> (Vec<String>, broadcast::Receiver<String>) {
        let inner = self.inner.lock().await;
        let replay = inner.ring.iter().cloned().collect();
        let rx = inner.tx.subscribe();
        (replay, rx)
    }

    /// Number of buffered frames (test visibility).
    pub async fn buffered(&self) -> usize {
        self.inner.lock().await.ring.len()
    }
}

impl Default for BusState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
