// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authenticated session handle
//!
//! [`AuthSession`] is the thing the inactivity monitor guards: it knows who
//! is signed in, exposes the authenticated flag as a watch channel so the
//! monitor can arm and disarm itself, and performs sign-out.
//!
//! Sign-out is local-first: the token and the authenticated flag are cleared
//! before any network call, and a failing remote endpoint never resurrects
//! the session. The remote call is attempted once and not retried.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use rand::RngCore;
use reqwest::Client;
use serde_json::json;
use tokio::sync::watch;

use crate::utils::mask_sensitive;

/// Timeout for calls to the remote sign-out endpoint. Sign-out is best
/// effort; a slow endpoint must not hold up local teardown.
pub const SIGN_OUT_TIMEOUT_SECS: u64 = 10;

/// An authenticated user session.
pub struct AuthSession {
    session_id: String,
    user_id: String,
    token: RwLock<Option<String>>,
    authenticated_tx: watch::Sender<bool>,
    sign_out_endpoint: Option<String>,
    client: Client,
    sign_out_calls: AtomicU32,
}

impl AuthSession {
    /// Create a session for a signed-in user.
    ///
    /// The session starts authenticated. A bearer token, when present, is
    /// sent to the remote sign-out endpoint during teardown and cleared
    /// locally regardless of what that endpoint says.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be constructed, which indicates a
    /// system configuration problem (TLS/SSL failure).
    pub fn new(user_id: impl Into<String>, token: Option<String>) -> Self {
        let user_id = user_id.into();
        let session_id = generate_session_id();
        let (authenticated_tx, _) = watch::channel(true);

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(SIGN_OUT_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client - this is a critical error that indicates a system configuration problem (TLS/SSL failure).");

        tracing::info!(
            "AUTH_SESSION_CREATED | session={} user={} token={}",
            session_id,
            user_id,
            token
                .as_deref()
                .map(|t| mask_sensitive(t, 8))
                .unwrap_or_else(|| "(none)".to_string())
        );

        Self {
            session_id,
            user_id,
            token: RwLock::new(token),
            authenticated_tx,
            sign_out_endpoint: None,
            client,
            sign_out_calls: AtomicU32::new(0),
        }
    }

    /// Set the remote endpoint that revokes the session server-side.
    pub fn with_sign_out_endpoint(mut self, url: impl Into<String>) -> Self {
        self.sign_out_endpoint = Some(url.into());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns true while the session is signed in.
    pub fn is_authenticated(&self) -> bool {
        *self.authenticated_tx.borrow()
    }

    /// Subscribe to changes of the authenticated flag.
    pub fn watch_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated_tx.subscribe()
    }

    /// Number of times [`sign_out`](Self::sign_out) has been invoked.
    pub fn sign_out_count(&self) -> u32 {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Mark the session as invalidated from outside (admin revocation,
    /// credential expiry observed elsewhere). Clears local state without
    /// calling the remote endpoint.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.token.write() {
            guard.take();
        }
        self.authenticated_tx.send_replace(false);
        tracing::info!(
            "AUTH_INVALIDATED | session={} user={}",
            self.session_id,
            self.user_id
        );
    }

    /// Mark the session as signed in again after a fresh login, replacing
    /// the stored token.
    pub fn renew(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
        self.authenticated_tx.send_replace(true);
        tracing::info!(
            "AUTH_RENEWED | session={} user={}",
            self.session_id,
            self.user_id
        );
    }

    /// End the session.
    ///
    /// Local state is cleared first and unconditionally: the token is
    /// dropped and the authenticated flag flips to false before any network
    /// I/O. The remote endpoint, when configured, is then told once; its
    /// failure is returned to the caller but changes nothing locally, and no
    /// retry is ever made.
    pub async fn sign_out(&self) -> Result<()> {
        let call = self.sign_out_calls.fetch_add(1, Ordering::SeqCst) + 1;

        let token = self.token.write().ok().and_then(|mut guard| guard.take());
        self.authenticated_tx.send_replace(false);
        tracing::info!(
            "AUTH_SIGNED_OUT | session={} user={} call={} at={}",
            self.session_id,
            self.user_id,
            call,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        if let (Some(endpoint), Some(token)) = (self.sign_out_endpoint.as_deref(), token) {
            let response = self
                .client
                .post(endpoint)
                .bearer_auth(&token)
                .json(&json!({ "session_id": self.session_id }))
                .send()
                .await
                .map_err(|e| anyhow!("sign-out request to {} failed: {}", endpoint, e))?;

            if !response.status().is_success() {
                bail!(
                    "sign-out endpoint {} returned HTTP {}",
                    endpoint,
                    response.status()
                );
            }

            tracing::info!(
                "AUTH_SIGN_OUT_ACKNOWLEDGED | session={} endpoint={}",
                self.session_id,
                endpoint
            );
        }

        Ok(())
    }

    /// Check that the remote sign-out endpoint answers at all.
    ///
    /// Any HTTP response counts as reachable; the endpoint may well reject
    /// a bodyless probe.
    pub async fn probe(&self) -> Result<()> {
        let endpoint = match self.sign_out_endpoint.as_deref() {
            Some(endpoint) => endpoint,
            None => {
                tracing::debug!(
                    "AUTH_PROBE_SKIPPED | session={} (no sign-out endpoint configured)",
                    self.session_id
                );
                return Ok(());
            }
        };

        self.client
            .head(endpoint)
            .send()
            .await
            .map_err(|e| anyhow!("sign-out endpoint {} is unreachable: {}", endpoint, e))?;
        Ok(())
    }
}

/// Generate a unique session identifier.
///
/// Combines a millisecond timestamp with 128 bits from the OS random number
/// generator, so ids stay unique across restarts and cannot be guessed from
/// the clock alone.
fn generate_session_id() -> String {
    let mut random_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut random_bytes);
    let random_hex: String = random_bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("sess_{}_{}", Utc::now().timestamp_millis(), random_hex)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_authenticated() {
        let auth = AuthSession::new("attorney_a", Some("tok_secret_value_123456".to_string()));
        assert!(auth.is_authenticated());
        assert!(auth.session_id().starts_with("sess_"));
        assert_eq!(auth.user_id(), "attorney_a");
        assert_eq!(auth.sign_out_count(), 0);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = AuthSession::new("user", None);
        let b = AuthSession::new("user", None);
        assert_ne!(a.session_id(), b.session_id());
    }

    #[tokio::test]
    async fn test_sign_out_clears_local_state() {
        let auth = AuthSession::new("attorney_a", Some("tok_secret_value_123456".to_string()));
        auth.sign_out().await.unwrap();
        assert!(!auth.is_authenticated());
        assert_eq!(auth.sign_out_count(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_can_be_called_again_safely() {
        let auth = AuthSession::new("attorney_a", None);
        auth.sign_out().await.unwrap();
        auth.sign_out().await.unwrap();
        assert!(!auth.is_authenticated());
        assert_eq!(auth.sign_out_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_notifies_watchers() {
        let auth = AuthSession::new("attorney_a", Some("tok_secret_value_123456".to_string()));
        let mut rx = auth.watch_authenticated();
        assert!(*rx.borrow());

        auth.invalidate();
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
        // No remote call is made, so the sign-out counter stays put
        assert_eq!(auth.sign_out_count(), 0);
    }

    #[tokio::test]
    async fn test_renew_after_invalidate_restores_authentication() {
        let auth = AuthSession::new("attorney_a", Some("tok_secret_value_123456".to_string()));
        let mut rx = auth.watch_authenticated();

        auth.invalidate();
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());

        auth.renew(Some("tok_fresh_value_654321".to_string()));
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(auth.is_authenticated());
    }

    #[tokio::test]
    async fn test_probe_without_endpoint_is_ok() {
        let auth = AuthSession::new("attorney_a", None);
        assert!(auth.probe().await.is_ok());
    }
}
