// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Login redirect construction
//!
//! After a sign-out the client is pointed back at the login screen with the
//! interrupted route carried in a query parameter, so that a successful
//! re-login can land the user where they left off.

use reqwest::Url;

/// Default path of the login screen.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Default query parameter carrying the interrupted route.
pub const DEFAULT_REDIRECT_PARAM: &str = "redirect";

/// Placeholder origin used only to drive the URL encoder; it never appears
/// in any produced value.
const ENCODER_ORIGIN: &str = "https://session.invalid";

/// Builds login URLs that preserve the route a signed-out user was on.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    login_path: String,
    redirect_param: String,
}

impl LoginRedirect {
    /// Create a redirect builder with the default `/login` path and
    /// `redirect` parameter.
    pub fn new() -> Self {
        Self {
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            redirect_param: DEFAULT_REDIRECT_PARAM.to_string(),
        }
    }

    /// Set a custom login screen path.
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set a custom query parameter name for the preserved route.
    pub fn with_redirect_param(mut self, param: impl Into<String>) -> Self {
        self.redirect_param = param.into();
        self
    }

    /// Build the login URL for an interrupted route.
    ///
    /// The route is percent-encoded as a query value, so nested paths and
    /// their own query strings survive the round trip:
    ///
    /// ```
    /// use idlegate::nav::LoginRedirect;
    ///
    /// let nav = LoginRedirect::new();
    /// assert_eq!(nav.url_for("/dashboard"), "/login?redirect=%2Fdashboard");
    /// ```
    pub fn url_for(&self, route: &str) -> String {
        // JUSTIFICATION for .expect(): static, known-good origin string. If it
        // fails to parse, it's a programming error that should fail fast, not
        // a runtime condition to handle.
        let mut url = Url::parse(ENCODER_ORIGIN)
            .expect("placeholder origin is a valid URL");
        url.set_path(&self.login_path);
        url.query_pairs_mut()
            .append_pair(&self.redirect_param, route);
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        }
    }
}

impl Default for LoginRedirect {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_encodes_route() {
        let nav = LoginRedirect::new();
        assert_eq!(nav.url_for("/dashboard"), "/login?redirect=%2Fdashboard");
    }

    #[test]
    fn test_url_for_preserves_nested_route_with_query() {
        let nav = LoginRedirect::new();
        assert_eq!(
            nav.url_for("/matters/42?tab=documents"),
            "/login?redirect=%2Fmatters%2F42%3Ftab%3Ddocuments"
        );
    }

    #[test]
    fn test_custom_login_path_and_param() {
        let nav = LoginRedirect::new()
            .with_login_path("/auth/sign-in")
            .with_redirect_param("next");
        assert_eq!(
            nav.url_for("/calendar"),
            "/auth/sign-in?next=%2Fcalendar"
        );
    }

    #[test]
    fn test_login_path_without_leading_slash_is_normalized() {
        let nav = LoginRedirect::new().with_login_path("login");
        assert_eq!(nav.url_for("/dashboard"), "/login?redirect=%2Fdashboard");
    }

    #[test]
    fn test_root_route() {
        let nav = LoginRedirect::new();
        assert_eq!(nav.url_for("/"), "/login?redirect=%2F");
    }
}
