// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Monitor state machine types
//!
//! The inactivity monitor is a small state machine: it is **armed** while the
//! user is signed in and active, shows a **warning** countdown once the idle
//! threshold passes, and ends **signed out** if the countdown reaches zero.
//! When there is no authenticated session it is **disarmed** and schedules
//! nothing at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Monitor States
// ============================================================================

/// States of the inactivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    /// Signed in, no warning visible; the idle clock is running
    Armed,
    /// The warning dialog is visible and counting down
    Warning,
    /// The session was ended; a login redirect has been produced
    SignedOut,
    /// No authenticated session; nothing is scheduled
    Disarmed,
}

impl MonitorState {
    /// Returns true while the monitor is actively guarding a session.
    pub fn is_engaged(&self) -> bool {
        matches!(self, MonitorState::Armed | MonitorState::Warning)
    }

    /// Returns true if the user has to go through login again.
    pub fn requires_login(&self) -> bool {
        matches!(self, MonitorState::SignedOut | MonitorState::Disarmed)
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Armed => write!(f, "ARMED"),
            MonitorState::Warning => write!(f, "WARNING"),
            MonitorState::SignedOut => write!(f, "SIGNED_OUT"),
            MonitorState::Disarmed => write!(f, "DISARMED"),
        }
    }
}

// ============================================================================
// Activity
// ============================================================================

/// Kinds of user input that count as activity and reset the idle clock.
///
/// Terminal focus regained counts as activity; a window resize does not,
/// since it can happen without anyone at the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    /// Key press
    Key,
    /// Mouse button press
    Mouse,
    /// Scroll wheel movement
    Wheel,
    /// Pasted input
    Paste,
    /// Terminal regained focus
    Focus,
}

impl ActivityKind {
    /// Short label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Key => "key",
            ActivityKind::Mouse => "mouse",
            ActivityKind::Wheel => "wheel",
            ActivityKind::Paste => "paste",
            ActivityKind::Focus => "focus",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Lifecycle Events
// ============================================================================

/// How a visible warning was dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DismissCause {
    /// Ordinary user input arrived while the warning was up
    Activity,
    /// The user explicitly chose to stay signed in
    StaySignedIn,
}

impl DismissCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            DismissCause::Activity => "activity",
            DismissCause::StaySignedIn => "stay_signed_in",
        }
    }
}

/// Why a session was ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignOutReason {
    /// The warning countdown reached zero
    IdleTimeout,
    /// The user asked to be signed out immediately
    UserRequest,
}

impl SignOutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutReason::IdleTimeout => "idle_timeout",
            SignOutReason::UserRequest => "user_request",
        }
    }
}

impl std::fmt::Display for SignOutReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monitor lifecycle events for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// The monitor started guarding a session
    Armed {
        session_id: String,
        timestamp: DateTime<Utc>,
        timeout_secs: u64,
    },
    /// User activity reset the idle clock
    ActivityObserved {
        session_id: String,
        timestamp: DateTime<Utc>,
        kind: ActivityKind,
    },
    /// The warning dialog became visible
    WarningShown {
        session_id: String,
        timestamp: DateTime<Utc>,
        countdown_secs: u64,
    },
    /// The warning dialog was dismissed and the full window restored
    WarningDismissed {
        session_id: String,
        timestamp: DateTime<Utc>,
        via: DismissCause,
    },
    /// The session was ended and a redirect produced
    SignedOut {
        session_id: String,
        timestamp: DateTime<Utc>,
        reason: SignOutReason,
        redirect: String,
    },
    /// The monitor stood down because the session went away
    Disarmed {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Convert event to audit log string.
    pub fn to_audit_string(&self) -> String {
        match self {
            MonitorEvent::Armed { session_id, timestamp, timeout_secs } => {
                format!(
                    "{} | MONITOR_ARMED | session={} timeout={}s",
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    session_id,
                    timeout_secs
                )
            }
            MonitorEvent::ActivityObserved { session_id, timestamp, kind } => {
                format!(
                    "{} | MONITOR_ACTIVITY | session={} kind={}",
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    session_id,
                    kind
                )
            }
            MonitorEvent::WarningShown { session_id, timestamp, countdown_secs } => {
                format!(
                    "{} | MONITOR_WARNING | session={} countdown={}s",
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    session_id,
                    countdown_secs
                )
            }
            MonitorEvent::WarningDismissed { session_id, timestamp, via } => {
                format!(
                    "{} | MONITOR_WARNING_DISMISSED | session={} via={}",
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    session_id,
                    via.as_str()
                )
            }
            MonitorEvent::SignedOut { session_id, timestamp, reason, redirect } => {
                format!(
                    "{} | MONITOR_SIGNED_OUT | session={} reason={} redirect={}",
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    session_id,
                    reason,
                    redirect
                )
            }
            MonitorEvent::Disarmed { session_id, timestamp } => {
                format!(
                    "{} | MONITOR_DISARMED | session={}",
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    session_id
                )
            }
        }
    }
}

// ============================================================================
// Published Status
// ============================================================================

/// Point-in-time snapshot of the monitor, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Current state of the machine
    pub state: MonitorState,
    /// Warning countdown: the configured starting value while armed, the live
    /// count while the warning is visible, zero once signed out
    pub seconds_remaining: u64,
    /// Login URL produced at sign-out, carrying the interrupted route
    pub redirect: Option<String>,
}

impl MonitorStatus {
    pub fn armed(countdown_reset_secs: u64) -> Self {
        Self {
            state: MonitorState::Armed,
            seconds_remaining: countdown_reset_secs,
            redirect: None,
        }
    }

    pub fn warning(seconds_remaining: u64) -> Self {
        Self {
            state: MonitorState::Warning,
            seconds_remaining,
            redirect: None,
        }
    }

    pub fn signed_out(redirect: String) -> Self {
        Self {
            state: MonitorState::SignedOut,
            seconds_remaining: 0,
            redirect: Some(redirect),
        }
    }

    pub fn disarmed() -> Self {
        Self {
            state: MonitorState::Disarmed,
            seconds_remaining: 0,
            redirect: None,
        }
    }

    /// Returns true while the warning dialog should be on screen.
    pub fn warning_visible(&self) -> bool {
        self.state == MonitorState::Warning
    }

    /// Returns true once the session has been ended.
    pub fn is_signed_out(&self) -> bool {
        self.state == MonitorState::SignedOut
    }
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self::disarmed()
    }
}

// ============================================================================
// Tests
// ============================================================================
