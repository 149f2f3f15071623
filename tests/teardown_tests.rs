// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Teardown and concurrency tests for the inactivity monitor.
//!
//! The monitor owns live timers, so the dangerous moments are the ones
//! where it goes away: an explicit `stop()`, a dropped handle, or many
//! callers racing to end the session at once. These tests pin down that
//! no timer outlives its monitor and that teardown happens exactly once
//! no matter how many callers ask for it.
//!
//! To run these tests:
//!
//! ```bash
//! cargo test --test teardown_tests
//! ```
//!
//! # Test Categories
//!
//! - Stop and drop: pending deadlines die with the monitor
//! - Command backlog: shutdown gets through a flooded queue
//! - Concurrency: activity storms and competing sign-out requests

use std::sync::Arc;
use std::time::Duration;

use idlegate::{
    ActivityKind, AuthSession, InactivityMonitor, LoginRedirect, MonitorConfig, MonitorState,
};

// Test configuration
const CONCURRENCY_LEVEL: usize = 8;
const ITERATIONS_PER_TASK: usize = 200;
const TEST_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// HELPERS
// ============================================================================

fn test_auth() -> Arc<AuthSession> {
    Arc::new(AuthSession::new(
        "attorney_a",
        Some("tok_test_value_123456".to_string()),
    ))
}

async fn drain() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

async fn advance_secs(secs: u64) {
    tokio::time::advance(Duration::from_secs(secs)).await;
    drain().await;
}

// ============================================================================
// STOP AND DROP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_warning() {
    let auth = test_auth();
    let monitor = InactivityMonitor::spawn(
        MonitorConfig::custom(10, 5),
        Arc::clone(&auth),
        LoginRedirect::new(),
    );
    let mut rx = monitor.subscribe();

    advance_secs(3).await;
    monitor.stop().await;

    // The channel closes without ever publishing a warning
    assert!(rx.changed().await.is_err());
    assert_eq!(rx.borrow().state, MonitorState::Armed);

    // Long past the old deadline nothing has fired and nobody signed out
    advance_secs(120).await;
    assert!(auth.is_authenticated());
    assert_eq!(auth.sign_out_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_countdown_leaves_session_signed_in() {
    let auth = test_auth();
    let monitor = InactivityMonitor::spawn(
        MonitorConfig::custom(10, 5),
        Arc::clone(&auth),
        LoginRedirect::new(),
    );

    advance_secs(5).await;
    assert!(monitor.status().warning_visible());
    monitor.stop().await;

    // Stopping mid-countdown is not a sign-out: the session stays live
    // and the countdown dies with the worker
    advance_secs(120).await;
    assert!(auth.is_authenticated());
    assert_eq!(auth.sign_out_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_handle_aborts_worker() {
    let auth = test_auth();
    let monitor = InactivityMonitor::spawn(
        MonitorConfig::custom(10, 5),
        Arc::clone(&auth),
        LoginRedirect::new(),
    );
    let mut rx = monitor.subscribe();

    drop(monitor);

    // The worker is aborted, so the status channel must close rather
    // than hang or keep publishing
    let closed = tokio::time::timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        while rx.changed().await.is_ok() {}
    })
    .await;
    assert!(closed.is_ok(), "status channel should close after drop");

    advance_secs(120).await;
    assert_eq!(auth.sign_out_count(), 0);
}

// ============================================================================
// COMMAND BACKLOG
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_gets_through_a_flooded_queue() {
    let auth = test_auth();
    let monitor = InactivityMonitor::spawn(
        MonitorConfig::custom(3600, 30),
        Arc::clone(&auth),
        LoginRedirect::new(),
    );

    // More events than the queue holds; the overflow is dropped, never
    // blocking the caller
    for _ in 0..ITERATIONS_PER_TASK {
        monitor.record_activity(ActivityKind::Key);
    }

    let stopped = tokio::time::timeout(
        Duration::from_secs(TEST_TIMEOUT_SECS),
        monitor.stop(),
    )
    .await;
    assert!(stopped.is_ok(), "stop should drain the backlog and return");
    assert!(auth.is_authenticated());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_activity_storm_never_blocks_or_misfires() {
    let auth = test_auth();
    let monitor = Arc::new(InactivityMonitor::spawn(
        MonitorConfig::custom(3600, 30),
        Arc::clone(&auth),
        LoginRedirect::new(),
    ));

    let mut handles = Vec::new();
    for task_id in 0..CONCURRENCY_LEVEL {
        let monitor = Arc::clone(&monitor);
        handles.push(tokio::spawn(async move {
            for i in 0..ITERATIONS_PER_TASK {
                monitor.record_activity(ActivityKind::Key);
                if i % 50 == task_id % 50 {
                    monitor.stay_signed_in().await.unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // The hour-long window never came close to expiring, so the storm
    // must leave the monitor exactly where it started
    assert_eq!(monitor.status().state, MonitorState::Armed);
    assert_eq!(auth.sign_out_count(), 0);

    if let Ok(monitor) = Arc::try_unwrap(monitor) {
        let stopped = tokio::time::timeout(
            Duration::from_secs(TEST_TIMEOUT_SECS),
            monitor.stop(),
        )
        .await;
        assert!(stopped.is_ok(), "stop should return promptly after the storm");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_sign_out_requests_tear_down_once() {
    let auth = test_auth();
    let monitor = Arc::new(InactivityMonitor::spawn(
        MonitorConfig::custom(3600, 30),
        Arc::clone(&auth),
        LoginRedirect::new(),
    ));

    let mut handles = Vec::new();
    for _ in 0..CONCURRENCY_LEVEL {
        let monitor = Arc::clone(&monitor);
        handles.push(tokio::spawn(async move {
            monitor.sign_out_now().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let final_status = tokio::time::timeout(
        Duration::from_secs(TEST_TIMEOUT_SECS),
        monitor.wait_signed_out(),
    )
    .await
    .expect("sign-out should complete promptly");

    // The worker serializes the requests: the first one tears the
    // session down, the rest land in a terminal state and do nothing
    assert_eq!(final_status.state, MonitorState::SignedOut);
    assert!(final_status.redirect.is_some());
    assert_eq!(auth.sign_out_count(), 1);
    assert!(!auth.is_authenticated());

    if let Ok(monitor) = Arc::try_unwrap(monitor) {
        monitor.stop().await;
    }
}
