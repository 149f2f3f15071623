// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Inactivity Session Monitor
//!
//! Watches for user inactivity and ends the session after a configurable
//! idle window, with a countdown warning before the end. This is the piece
//! that keeps an unattended client from staying signed in to privileged
//! case data.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐  commands   ┌──────────────────┐
//! │ InactivityMonitor  │────────────▶│ Worker (tokio)   │
//! │ (handle)           │◀────────────│ owns every timer │
//! └────────────────────┘   status    └────────┬─────────┘
//!                                             │ sign_out()
//!                                             ▼
//!                                    ┌──────────────────┐
//!                                    │ AuthSession      │
//!                                    │ (watch: authed)  │
//!                                    └──────────────────┘
//! ```
//!
//! The worker is the only place deadlines exist. Activity, explicit
//! dismissal, disarming and shutdown all supersede the pending deadline by
//! rebuilding it, never by racing it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use idlegate::auth::AuthSession;
//! use idlegate::monitor::{ActivityKind, InactivityMonitor, MonitorConfig};
//! use idlegate::nav::LoginRedirect;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let auth = Arc::new(AuthSession::new("attorney_a", None));
//! let monitor = InactivityMonitor::spawn(
//!     MonitorConfig::custom(3600, 30),
//!     auth,
//!     LoginRedirect::new(),
//! );
//!
//! // Forward user input as it happens
//! monitor.record_activity(ActivityKind::Key);
//!
//! // Watch the state machine
//! let status = monitor.status();
//! if status.warning_visible() {
//!     monitor.stay_signed_in().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod state;

// Re-export commonly used items
pub use config::{MonitorConfig, DEFAULT_TIMEOUT_SECS, DEFAULT_WARNING_SECS, MIN_TIMEOUT_SECS};
pub use engine::{InactivityMonitor, MonitorCommand};
pub use state::{
    ActivityKind, DismissCause, MonitorEvent, MonitorState, MonitorStatus, SignOutReason,
};
