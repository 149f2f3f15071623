// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Monitor timing configuration
//!
//! Two knobs control the whole machine: the total inactivity window and the
//! warning countdown at its end. The warning appears after
//! `timeout - warning` seconds of idle time, and the countdown reaching zero
//! *is* the timeout. There is no separate hard-timeout timer to drift away
//! from the visible countdown.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default total inactivity window before sign-out (1 hour).
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Default warning countdown at the end of the window (30 seconds).
pub const DEFAULT_WARNING_SECS: u64 = 30;

/// Smallest usable inactivity window. The countdown needs at least one
/// second, and there has to be at least one second of armed time before it.
pub const MIN_TIMEOUT_SECS: u64 = 2;

/// Timing configuration for the inactivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Total seconds of inactivity before the session is ended
    pub timeout_secs: u64,
    /// Seconds of warning countdown at the end of the window
    pub warning_secs: u64,
}

impl MonitorConfig {
    /// Create a custom configuration, clamping values into a usable range.
    ///
    /// The warning countdown always fits strictly inside the window, so the
    /// warning appears at least one second after arming and runs for at
    /// least one second.
    pub fn custom(timeout_secs: u64, warning_secs: u64) -> Self {
        let clamped_timeout = timeout_secs.max(MIN_TIMEOUT_SECS);
        if timeout_secs < MIN_TIMEOUT_SECS {
            tracing::warn!(
                "MONITOR_CONFIG: Requested timeout {}s is below the {}s minimum. Clamped to {}s.",
                timeout_secs,
                MIN_TIMEOUT_SECS,
                clamped_timeout
            );
        }

        let clamped_warning = warning_secs.clamp(1, clamped_timeout - 1);
        if clamped_warning != warning_secs {
            tracing::warn!(
                "MONITOR_CONFIG: Warning countdown {}s does not fit inside the {}s timeout. Clamped to {}s.",
                warning_secs,
                clamped_timeout,
                clamped_warning
            );
        }

        Self {
            timeout_secs: clamped_timeout,
            warning_secs: clamped_warning,
        }
    }

    /// Idle time before the warning appears.
    pub fn warning_delay(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.saturating_sub(self.warning_secs))
    }

    /// Starting value of the warning countdown.
    pub fn countdown_start(&self) -> u64 {
        self.warning_secs
    }

    /// The full inactivity window.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            warning_secs: DEFAULT_WARNING_SECS,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.warning_secs, DEFAULT_WARNING_SECS);
        assert_eq!(config.warning_delay(), Duration::from_secs(3570));
    }

    #[test]
    fn test_custom_passes_valid_values_through() {
        let config = MonitorConfig::custom(10, 5);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.warning_secs, 5);
        assert_eq!(config.warning_delay(), Duration::from_secs(5));
        assert_eq!(config.countdown_start(), 5);
        assert_eq!(config.window(), Duration::from_secs(10));
    }

    #[test]
    fn test_custom_clamps_oversized_warning() {
        let config = MonitorConfig::custom(10, 60);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.warning_secs, 9);
    }

    #[test]
    fn test_custom_clamps_zero_warning() {
        let config = MonitorConfig::custom(10, 0);
        assert_eq!(config.warning_secs, 1);
    }

    #[test]
    fn test_custom_clamps_tiny_timeout() {
        let config = MonitorConfig::custom(0, 0);
        assert_eq!(config.timeout_secs, MIN_TIMEOUT_SECS);
        assert_eq!(config.warning_secs, 1);
        assert_eq!(config.warning_delay(), Duration::from_secs(1));
    }
}
