// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;

use crate::frame::Reply;

use super::*;

#[tokio::test]
async fn deliver_wakes_waiter_with_payload() {
    let pending = PendingMap::new();
    let (id, waiter) = pending.issue("peer-1", Duration::from_secs(1)).await;

    pending.deliver(Reply::ok(&id, json!({"echo": 42}))).await;
    let reply = waiter.wait().await;
    assert!(reply.success);
    assert_eq!(reply.data, Some(json!({"echo": 42})));
    assert_eq!(pending.in_flight().await, 0);
}

#[tokio::test]
async fn timeout_resolves_and_removes_entry() {
    let pending = PendingMap::new();
    let (id, waiter) = pending.issue("peer-1", Duration::from_millis(20)).await;

    let reply = waiter.wait().await;
    assert!(!reply.success);
    assert_eq!(reply.error.as_deref(), Some(TIMEOUT_ERROR));
    assert!(!pending.contains(&id).await, "timeout must not leak a waiter");
}

#[tokio::test]
async fn deliver_unknown_id_is_noop() {
    let pending = PendingMap::new();
    pending.deliver(Reply::ok("ghost", json!({}))).await;
    assert_eq!(pending.in_flight().await, 0);
}

#[tokio::test]
async fn late_delivery_after_timeout_is_dropped() {
    let pending = PendingMap::new();
    let (id, waiter) = pending.issue("peer-1", Duration::from_millis(10)).await;
    let reply = waiter.wait().await;
    assert!(!reply.success);

    // The page answers after the caller gave up.
    pending.deliver(Reply::ok(&id, json!({"late": true}))).await;
    assert_eq!(pending.in_flight().await, 0);
}

#[tokio::test]
async fn fail_peer_resolves_only_that_peers_calls() {
    let pending = PendingMap::new();
    let (_id_a, waiter_a) = pending.issue("peer-a", Duration::from_secs(1)).await;
    let (id_b, waiter_b) = pending.issue("peer-b", Duration::from_secs(1)).await;

    pending.fail_peer("peer-a", "page disconnected").await;

    let reply_a = waiter_a.wait().await;
    assert!(!reply_a.success);
    assert_eq!(reply_a.error.as_deref(), Some("page disconnected"));

    pending.deliver(Reply::ok(&id_b, json!({}))).await;
    assert!(waiter_b.wait().await.success);
}

#[tokio::test]
async fn ids_are_unique_across_inflight_requests() {
    let pending = PendingMap::new();
    let mut ids = std::collections::HashSet::new();
    for _ in 0..64 {
        let (id, _waiter) = pending.issue("peer", Duration::from_secs(1)).await;
        assert!(ids.insert(id), "correlation ids must never repeat");
    }
}

#[test]
fn concurrent_callers_receive_their_own_replies() {
    // Property: N concurrent callers each get back exactly the payload
    // issued under their own correlation id, regardless of delivery order.
    use proptest::prelude::*;

    let mut runner = proptest::test_runner::TestRunner::default();
    let strategy = (2usize..24, proptest::collection::vec(any::<u32>(), 2..24));
    runner
        .run(&strategy, |(rotate, payloads)| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            rt.block_on(async move {
                let pending = PendingMap::new();
                let mut waiters = Vec::new();
                for payload in &payloads {
                    let (id, waiter) = pending.issue("peer", Duration::from_secs(5)).await;
                    waiters.push((id, *payload, waiter));
                }
                // Deliver replies in a rotated order to simulate the page
                // interleaving answers freely.
                let mut order: Vec<usize> = (0..waiters.len()).collect();
                order.rotate_left(rotate % waiters.len());
                for i in order {
                    let (id, payload, _) = &waiters[i];
                    pending.deliver(Reply::ok(id, json!({"n": payload}))).await;
                }
                for (_, payload, waiter) in waiters {
                    let reply = waiter.wait().await;
                    prop_assert!(reply.success);
                    prop_assert_eq!(reply.data, Some(json!({"n": payload})));
                }
                prop_assert_eq!(pending.in_flight().await, 0);
                Ok(())
            })
        })
        .unwrap();
}
