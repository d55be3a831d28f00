//! Login screen: route signed-in users onward, start OAuth for everyone else.

use std::sync::Arc;

use backend::AuthApi;
use backend::config::DEFAULT_OAUTH_PROVIDER;

use crate::nav::{Navigator, Route};

/// Result of mounting the login screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// A session exists; the user was sent to the dashboard.
    Redirected,
    /// No session; the sign-in control should be shown.
    SignInRequired,
}

pub struct SessionGate {
    auth: Arc<dyn AuthApi>,
    navigator: Arc<dyn Navigator>,
    provider: String,
}

impl SessionGate {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthApi>, navigator: Arc<dyn Navigator>) -> Self {
        Self { auth, navigator, provider: DEFAULT_OAUTH_PROVIDER.to_owned() }
    }

    /// Use `provider` for sign-in instead of the default.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Check for an existing session. A failed lookup counts as no session.
    pub async fn init(&self) -> GateOutcome {
        let session = match self.auth.session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(error = %e, "session lookup failed; treating as signed out");
                None
            }
        };

        if let Some(session) = session {
            tracing::info!(user_id = %session.user.id, "session found; opening dashboard");
            self.navigator.navigate(Route::Dashboard);
            return GateOutcome::Redirected;
        }
        GateOutcome::SignInRequired
    }

    /// Start the OAuth flow. Returns the URL the user must visit, or `None`
    /// when the request failed; the user can simply retry.
    pub async fn sign_in(&self) -> Option<String> {
        match self.auth.sign_in_with_provider(&self.provider).await {
            Ok(url) => {
                tracing::info!(provider = %self.provider, "sign-in started");
                Some(url)
            }
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "sign-in failed to start");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;
