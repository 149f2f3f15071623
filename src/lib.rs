// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! idlegate - Session inactivity guard for terminal clients
//!
//! Warn first, then sign out.
//!
//! idlegate watches user input on behalf of a signed-in client, raises a
//! countdown warning once a configurable idle window has passed, and ends
//! the session when the countdown runs out. Teardown is local-first: the
//! token is cleared and a login redirect produced even when the backend
//! cannot be reached.
//!
//! **Armed** -> **Warning (countdown)** -> **Signed out (redirect)**
//!
//! # Core Modules
//!
//! - [`monitor`] - The inactivity state machine and its single-worker engine
//! - [`auth`] - Authenticated session handle and local-first sign-out
//! - [`nav`] - Login redirect URLs that preserve the interrupted route
//! - [`dialog`] - Warning dialog and status line rendering
//! - [`audit`] - Append-only session audit log with redaction
//! - [`error`] - User-facing failure reports with exit codes

pub mod audit;
pub mod auth;
pub mod dialog;
pub mod error;
pub mod monitor;
pub mod nav;
pub mod utils;

// Re-export monitor types
pub use monitor::{
    ActivityKind, InactivityMonitor, MonitorConfig, MonitorEvent, MonitorState, MonitorStatus,
    SignOutReason,
};

// Re-export session types
pub use auth::AuthSession;

// Re-export navigation types
pub use nav::LoginRedirect;

// Re-export dialog types
pub use dialog::DialogStyle;

// Re-export audit logging
pub use audit::{
    audit_event, init_audit_logger, is_audit_enabled, set_audit_enabled, AuditEntry, AuditLogger,
};

// Re-export failure reporting
pub use error::FailureReport;
