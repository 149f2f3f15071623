// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Inactivity monitor engine
//!
//! A single worker task owns the whole state machine and every timer in it.
//! Callers talk to the worker over a command channel and observe it through
//! a watch channel; nothing outside the worker ever schedules or cancels a
//! deadline.
//!
//! The deadline for the next wake-up is rebuilt from the current phase on
//! every pass of the loop. Superseding a deadline (activity arrives, the
//! session disarms, the user stays signed in) simply drops the old sleep
//! future, so a stale timer can never fire.
//!
//! The warning countdown reaching zero *is* the inactivity timeout: the
//! warning appears `warning_secs` before the end of the window and counts
//! those seconds down. One mechanism, one clock, no drift between what the
//! user sees and when the session actually ends.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

use crate::auth::AuthSession;
use crate::nav::LoginRedirect;

use super::config::MonitorConfig;
use super::state::{ActivityKind, DismissCause, MonitorEvent, MonitorStatus, SignOutReason};

/// Depth of the command queue. Activity events are sent without blocking;
/// when the queue is full a reset is already pending, so dropping one more
/// event loses nothing.
const COMMAND_QUEUE_DEPTH: usize = 100;

// ============================================================================
// Commands
// ============================================================================

/// Commands handled by the monitor worker.
#[derive(Debug)]
pub enum MonitorCommand {
    /// User input that resets the idle clock
    Activity { kind: ActivityKind },
    /// Explicit "stay signed in" from the warning dialog
    StaySignedIn,
    /// Explicit immediate sign-out
    SignOutNow,
    /// Route the client is currently on, used for the login redirect
    SetRoute { path: String },
    /// Stop the worker
    Shutdown,
}

// ============================================================================
// Worker Phase
// ============================================================================

/// Worker-internal phase. Deadlines live here and nowhere else.
#[derive(Debug)]
enum Phase {
    /// Guarding an idle session; the warning appears at `warn_at`
    Armed { warn_at: Instant },
    /// Warning visible; `remaining` seconds left, next tick at `next_tick`
    Warning { remaining: u64, next_tick: Instant },
    /// No authenticated session; nothing scheduled
    Disarmed,
    /// Terminal; the session has been ended
    SignedOut,
}

// ============================================================================
// Monitor Handle
// ============================================================================

/// Handle to a running inactivity monitor.
///
/// Dropping the handle aborts the worker, which cancels every pending
/// timer with it.
pub struct InactivityMonitor {
    command_tx: mpsc::Sender<MonitorCommand>,
    status_rx: watch::Receiver<MonitorStatus>,
    worker: JoinHandle<()>,
}

impl InactivityMonitor {
    /// Start the monitor for a session.
    ///
    /// The worker arms itself immediately when the session is authenticated
    /// and stays disarmed otherwise, following the authenticated flag from
    /// there on.
    pub fn spawn(config: MonitorConfig, auth: Arc<AuthSession>, nav: LoginRedirect) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let authed_rx = auth.watch_authenticated();

        let initial = if *authed_rx.borrow() {
            MonitorStatus::armed(config.countdown_start())
        } else {
            MonitorStatus::disarmed()
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let worker = tokio::spawn(async move {
            Self::worker_loop(command_rx, authed_rx, status_tx, auth, nav, config).await;
        });

        Self {
            command_tx,
            status_rx,
            worker,
        }
    }

    /// Record user activity.
    ///
    /// Never blocks and never fails. The event is dropped when the queue is
    /// full, which is harmless: any queued activity already restores the
    /// full inactivity window.
    pub fn record_activity(&self, kind: ActivityKind) {
        let _ = self.command_tx.try_send(MonitorCommand::Activity { kind });
    }

    /// Dismiss the warning and restart the full inactivity window.
    ///
    /// Harmless when no warning is visible.
    pub async fn stay_signed_in(&self) -> Result<()> {
        self.command_tx
            .send(MonitorCommand::StaySignedIn)
            .await
            .map_err(|e| anyhow!("Failed to reach monitor worker: {}", e))
    }

    /// End the session right now, without waiting for the countdown.
    pub async fn sign_out_now(&self) -> Result<()> {
        self.command_tx
            .send(MonitorCommand::SignOutNow)
            .await
            .map_err(|e| anyhow!("Failed to reach monitor worker: {}", e))
    }

    /// Tell the monitor which route the client is on, so a later sign-out
    /// can send the user back there after login.
    pub async fn set_route(&self, path: impl Into<String>) -> Result<()> {
        self.command_tx
            .send(MonitorCommand::SetRoute { path: path.into() })
            .await
            .map_err(|e| anyhow!("Failed to reach monitor worker: {}", e))
    }

    /// Latest status snapshot.
    pub fn status(&self) -> MonitorStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status updates.
    pub fn subscribe(&self) -> watch::Receiver<MonitorStatus> {
        self.status_rx.clone()
    }

    /// Wait until the monitor reaches its terminal state and return the
    /// final status, including the login redirect.
    pub async fn wait_signed_out(&self) -> MonitorStatus {
        let mut rx = self.status_rx.clone();
        loop {
            let status = rx.borrow_and_update().clone();
            if status.is_signed_out() {
                return status;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Stop the worker, cancelling every pending timer.
    pub async fn stop(mut self) {
        let _ = self.command_tx.send(MonitorCommand::Shutdown).await;
        let _ = (&mut self.worker).await;
    }

    // ========================================================================
    // Worker
    // ========================================================================

    async fn worker_loop(
        mut command_rx: mpsc::Receiver<MonitorCommand>,
        mut authed_rx: watch::Receiver<bool>,
        status_tx: watch::Sender<MonitorStatus>,
        auth: Arc<AuthSession>,
        nav: LoginRedirect,
        config: MonitorConfig,
    ) {
        let session_id = auth.session_id().to_string();
        let mut route = String::from("/");

        let mut phase = if *authed_rx.borrow_and_update() {
            tracing::info!(
                "{}",
                MonitorEvent::Armed {
                    session_id: session_id.clone(),
                    timestamp: Utc::now(),
                    timeout_secs: config.timeout_secs,
                }
                .to_audit_string()
            );
            Self::armed_phase(&config)
        } else {
            Phase::Disarmed
        };

        loop {
            let wake_at = match &phase {
                Phase::Armed { warn_at } => Some(*warn_at),
                Phase::Warning { next_tick, .. } => Some(*next_tick),
                // Quiescent phases schedule nothing
                Phase::Disarmed | Phase::SignedOut => None,
            };

            tokio::select! {
                // biased: queued commands and auth changes outrank a deadline
                // landing on the same instant, so activity racing the warning
                // always wins.
                biased;

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(MonitorCommand::Activity { kind }) => {
                            match phase {
                                Phase::Armed { .. } => {
                                    tracing::debug!(
                                        "{}",
                                        MonitorEvent::ActivityObserved {
                                            session_id: session_id.clone(),
                                            timestamp: Utc::now(),
                                            kind,
                                        }
                                        .to_audit_string()
                                    );
                                    phase = Self::armed_phase(&config);
                                }
                                Phase::Warning { .. } => {
                                    tracing::info!(
                                        "{}",
                                        MonitorEvent::WarningDismissed {
                                            session_id: session_id.clone(),
                                            timestamp: Utc::now(),
                                            via: DismissCause::Activity,
                                        }
                                        .to_audit_string()
                                    );
                                    phase = Self::armed_phase(&config);
                                    let _ = status_tx.send(MonitorStatus::armed(config.countdown_start()));
                                }
                                Phase::Disarmed | Phase::SignedOut => {
                                    tracing::debug!(
                                        "MONITOR_ACTIVITY_IGNORED | session={} kind={}",
                                        session_id,
                                        kind
                                    );
                                }
                            }
                        }
                        Some(MonitorCommand::StaySignedIn) => {
                            match phase {
                                Phase::Warning { .. } => {
                                    tracing::info!(
                                        "{}",
                                        MonitorEvent::WarningDismissed {
                                            session_id: session_id.clone(),
                                            timestamp: Utc::now(),
                                            via: DismissCause::StaySignedIn,
                                        }
                                        .to_audit_string()
                                    );
                                    phase = Self::armed_phase(&config);
                                    let _ = status_tx.send(MonitorStatus::armed(config.countdown_start()));
                                }
                                Phase::Armed { .. } => {
                                    // Idempotent: confirming an already-armed
                                    // session just refreshes the idle clock
                                    phase = Self::armed_phase(&config);
                                }
                                Phase::Disarmed | Phase::SignedOut => {
                                    tracing::debug!(
                                        "MONITOR_STAY_IGNORED | session={} (no active session)",
                                        session_id
                                    );
                                }
                            }
                        }
                        Some(MonitorCommand::SignOutNow) => {
                            if matches!(phase, Phase::Armed { .. } | Phase::Warning { .. }) {
                                phase = Self::sign_out_phase(
                                    SignOutReason::UserRequest,
                                    &session_id,
                                    &route,
                                    &auth,
                                    &nav,
                                    &status_tx,
                                )
                                .await;
                            } else {
                                tracing::debug!(
                                    "MONITOR_SIGN_OUT_IGNORED | session={} (no active session)",
                                    session_id
                                );
                            }
                        }
                        Some(MonitorCommand::SetRoute { path }) => {
                            tracing::debug!(
                                "MONITOR_ROUTE | session={} route={}",
                                session_id,
                                path
                            );
                            route = path;
                        }
                        Some(MonitorCommand::Shutdown) | None => {
                            tracing::debug!("MONITOR_SHUTDOWN | session={}", session_id);
                            break;
                        }
                    }
                }

                changed = authed_rx.changed() => {
                    if changed.is_err() {
                        // Session handle dropped entirely; nothing left to guard
                        break;
                    }
                    let authenticated = *authed_rx.borrow();
                    if !authenticated {
                        if matches!(phase, Phase::Armed { .. } | Phase::Warning { .. }) {
                            tracing::info!(
                                "{}",
                                MonitorEvent::Disarmed {
                                    session_id: session_id.clone(),
                                    timestamp: Utc::now(),
                                }
                                .to_audit_string()
                            );
                            phase = Phase::Disarmed;
                            let _ = status_tx.send(MonitorStatus::disarmed());
                        }
                        // SignedOut stays terminal; the flag flip from our own
                        // teardown lands here and changes nothing
                    } else if matches!(phase, Phase::Disarmed) {
                        tracing::info!(
                            "{}",
                            MonitorEvent::Armed {
                                session_id: session_id.clone(),
                                timestamp: Utc::now(),
                                timeout_secs: config.timeout_secs,
                            }
                            .to_audit_string()
                        );
                        phase = Self::armed_phase(&config);
                        let _ = status_tx.send(MonitorStatus::armed(config.countdown_start()));
                    }
                }

                // Disabled (never even polled) while no deadline is set, so
                // quiescent phases hold no timer at all.
                _ = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {
                    match phase {
                        Phase::Armed { .. } => {
                            let countdown = config.countdown_start();
                            tracing::warn!(
                                "{}",
                                MonitorEvent::WarningShown {
                                    session_id: session_id.clone(),
                                    timestamp: Utc::now(),
                                    countdown_secs: countdown,
                                }
                                .to_audit_string()
                            );
                            phase = Phase::Warning {
                                remaining: countdown,
                                next_tick: Instant::now() + Duration::from_secs(1),
                            };
                            let _ = status_tx.send(MonitorStatus::warning(countdown));
                        }
                        Phase::Warning { remaining, next_tick } => {
                            let remaining = remaining.saturating_sub(1);
                            if remaining == 0 {
                                // The countdown hitting zero is the timeout
                                phase = Self::sign_out_phase(
                                    SignOutReason::IdleTimeout,
                                    &session_id,
                                    &route,
                                    &auth,
                                    &nav,
                                    &status_tx,
                                )
                                .await;
                            } else {
                                tracing::debug!(
                                    "MONITOR_COUNTDOWN | session={} remaining={}s",
                                    session_id,
                                    remaining
                                );
                                // Ticks are anchored to the previous tick, not
                                // to now(), so the countdown cannot drift
                                phase = Phase::Warning {
                                    remaining,
                                    next_tick: next_tick + Duration::from_secs(1),
                                };
                                let _ = status_tx.send(MonitorStatus::warning(remaining));
                            }
                        }
                        Phase::Disarmed | Phase::SignedOut => {}
                    }
                }
            }
        }
    }

    /// A fresh full inactivity window.
    fn armed_phase(config: &MonitorConfig) -> Phase {
        Phase::Armed {
            warn_at: Instant::now() + config.warning_delay(),
        }
    }

    /// End the session: local teardown first, one best-effort remote call,
    /// then the terminal status carrying the login redirect.
    async fn sign_out_phase(
        reason: SignOutReason,
        session_id: &str,
        route: &str,
        auth: &AuthSession,
        nav: &LoginRedirect,
        status_tx: &watch::Sender<MonitorStatus>,
    ) -> Phase {
        let redirect = nav.url_for(route);

        if let Err(e) = auth.sign_out().await {
            // Remote failure never blocks teardown and is not retried
            tracing::warn!(
                "MONITOR_REMOTE_SIGN_OUT_FAILED | session={} error={}",
                session_id,
                e
            );
        }

        tracing::warn!(
            "{}",
            MonitorEvent::SignedOut {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
                reason,
                redirect: redirect.clone(),
            }
            .to_audit_string()
        );

        let _ = status_tx.send(MonitorStatus::signed_out(redirect));
        Phase::SignedOut
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        // A dropped handle must not leave the worker and its timers behind
        self.worker.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::state::MonitorState;

    fn test_auth() -> Arc<AuthSession> {
        Arc::new(AuthSession::new("test_user", None))
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawns_armed_for_authenticated_session() {
        let monitor = InactivityMonitor::spawn(
            MonitorConfig::custom(10, 5),
            test_auth(),
            LoginRedirect::new(),
        );
        let status = monitor.status();
        assert_eq!(status.state, MonitorState::Armed);
        assert_eq!(status.seconds_remaining, 5);
        assert!(status.redirect.is_none());
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawns_disarmed_without_session() {
        let auth = test_auth();
        auth.invalidate();
        let monitor = InactivityMonitor::spawn(
            MonitorConfig::custom(10, 5),
            auth,
            LoginRedirect::new(),
        );
        assert_eq!(monitor.status().state, MonitorState::Disarmed);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_activity_never_blocks() {
        let monitor = InactivityMonitor::spawn(
            MonitorConfig::custom(10, 5),
            test_auth(),
            LoginRedirect::new(),
        );
        // Flood well past the queue depth without yielding once; try_send
        // must shrug off the overflow
        for _ in 0..(COMMAND_QUEUE_DEPTH * 3) {
            monitor.record_activity(ActivityKind::Key);
        }
        assert_eq!(monitor.status().state, MonitorState::Armed);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_clean() {
        let monitor = InactivityMonitor::spawn(
            MonitorConfig::custom(10, 5),
            test_auth(),
            LoginRedirect::new(),
        );
        let mut rx = monitor.subscribe();
        monitor.stop().await;
        // Worker gone: the status channel closes instead of publishing more
        assert!(rx.changed().await.is_err());
    }
}
