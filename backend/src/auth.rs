//! Hosted auth adapter: OAuth redirect, session refresh, user lookup and sign-out.
//!
//! ARCHITECTURE
//! ============
//! The adapter caches the current session in memory and falls back to its
//! [`SessionStore`] on a cold start. An expired access token is exchanged
//! once through the refresh grant; if the service rejects the refresh the
//! session is forgotten and callers see "not signed in".
//!
//! Sign-in is a two-step redirect: [`HostedAuth::authorize_url`] names the
//! provider page to send the user to, and the provider's return URL is
//! handed back to [`HostedAuth::complete_sign_in`], which lifts the tokens
//! out of the URL fragment.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::api::AuthApi;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::http;
use crate::session_store::SessionStore;
use crate::types::{Session, User};

pub struct HostedAuth {
    http: reqwest::Client,
    config: BackendConfig,
    store: Arc<dyn SessionStore>,
    current: RwLock<Option<Session>>,
}

/// Tokens carried by the OAuth return URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: Option<i64>,
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Result<Session, BackendError> {
        let expires_at = resolve_expiry(self.expires_at, self.expires_in, now, BackendError::Parse)?;
        Ok(Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_owned()),
            expires_at,
            user: self.user,
        })
    }
}

/// Absolute expiry from an explicit `expires_at` or a relative `expires_in`.
/// An `expires_in` that overflows when added to `now` is reported through
/// `invalid`.
fn resolve_expiry(
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    now: i64,
    invalid: fn(String) -> BackendError,
) -> Result<Option<i64>, BackendError> {
    match (expires_at, expires_in) {
        (Some(at), _) => Ok(Some(at)),
        (None, Some(secs)) => now
            .checked_add(secs)
            .map(Some)
            .ok_or_else(|| invalid(format!("expires_in out of range: {secs}"))),
        (None, None) => Ok(None),
    }
}

impl HostedAuth {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BackendConfig, store: Arc<dyn SessionStore>) -> Result<Self, BackendError> {
        let http = http::build_client(config.timeouts)?;
        Ok(Self { http, config, store, current: RwLock::new(None) })
    }

    /// Provider page that starts the OAuth flow.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ConfigParse`] if the configured base URL is not a URL.
    pub fn authorize_url(&self, provider: &str) -> Result<String, BackendError> {
        let mut params = vec![("provider", provider)];
        if let Some(redirect_to) = self.config.redirect_to.as_deref() {
            params.push(("redirect_to", redirect_to));
        }
        reqwest::Url::parse_with_params(&self.config.auth_url("authorize"), &params)
            .map(String::from)
            .map_err(|e| BackendError::ConfigParse(e.to_string()))
    }

    /// Finish sign-in from the provider's return URL and store the session.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Callback`] if the URL carries an error or no
    /// access token, and backend errors from the user lookup or store.
    pub async fn complete_sign_in(&self, callback_url: &str) -> Result<Session, BackendError> {
        let tokens = parse_callback(callback_url, Utc::now().timestamp())?;
        let user = self
            .fetch_user(&tokens.access_token)
            .await?
            .ok_or_else(|| BackendError::Callback("auth service rejected the access token".to_owned()))?;

        let session = Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_at: tokens.expires_at,
            user,
        };
        self.remember(session.clone()).await?;
        tracing::info!(user_id = %session.user.id, "sign-in completed");
        Ok(session)
    }

    async fn remember(&self, session: Session) -> Result<(), BackendError> {
        self.store.save(&session)?;
        *self.current.write().await = Some(session);
        Ok(())
    }

    async fn forget(&self) {
        *self.current.write().await = None;
        self.clear_stored();
    }

    fn clear_stored(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "failed to clear stored session");
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let url = format!("{}?grant_type=refresh_token", self.config.auth_url("token"));
        let request = self
            .http
            .post(url)
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        let text = http::send(request).await?;
        let token: TokenResponse = http::parse_json(&text)?;
        token.into_session(Utc::now().timestamp())
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Option<User>, BackendError> {
        let request = self
            .http
            .get(self.config.auth_url("user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token);
        match http::send(request).await {
            Ok(text) => http::parse_json(&text).map(Some),
            Err(e) if e.is_unauthorized() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl AuthApi for HostedAuth {
    async fn session(&self) -> Result<Option<Session>, BackendError> {
        if let Some(session) = self.current.read().await.clone().filter(|s| !s.is_expired()) {
            return Ok(Some(session));
        }

        // Held across the refresh so concurrent callers spend the refresh
        // token once; later callers see the refreshed session below.
        let mut current = self.current.write().await;
        let session = match current.clone() {
            Some(session) => session,
            None => match self.store.load()? {
                Some(session) => session,
                None => return Ok(None),
            },
        };

        if !session.is_expired() {
            *current = Some(session.clone());
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            tracing::debug!("session expired without refresh token");
            *current = None;
            self.clear_stored();
            return Ok(None);
        };

        match self.refresh(refresh_token).await {
            Ok(fresh) => {
                tracing::debug!(user_id = %fresh.user.id, "session refreshed");
                self.store.save(&fresh)?;
                *current = Some(fresh.clone());
                Ok(Some(fresh))
            }
            Err(BackendError::Response { status, .. }) => {
                tracing::warn!(status, "session refresh rejected");
                *current = None;
                self.clear_stored();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn user(&self) -> Result<Option<User>, BackendError> {
        let Some(session) = self.session().await? else {
            return Ok(None);
        };
        self.fetch_user(&session.access_token).await
    }

    async fn sign_in_with_provider(&self, provider: &str) -> Result<String, BackendError> {
        let url = self.authorize_url(provider)?;
        tracing::info!(%provider, "starting OAuth sign-in");
        Ok(url)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let session = self.current.read().await.clone();
        let session = match session {
            Some(session) => Some(session),
            None => self.store.load().ok().flatten(),
        };

        let result = match session {
            Some(session) => {
                let request = self
                    .http
                    .post(self.config.auth_url("logout"))
                    .header("apikey", &self.config.anon_key)
                    .bearer_auth(&session.access_token);
                http::send(request).await.map(|_| ())
            }
            None => Ok(()),
        };

        // Local state goes regardless of what the service said.
        self.forget().await;
        result
    }
}

/// Lift session tokens out of an OAuth return URL.
///
/// Tokens are read from the fragment, falling back to the query string.
/// `expires_at` wins over `expires_in`, which is resolved against `now`.
///
/// # Errors
///
/// Returns [`BackendError::Callback`] when the URL is unparsable, reports a
/// provider error, or carries no access token.
pub fn parse_callback(callback_url: &str, now: i64) -> Result<CallbackTokens, BackendError> {
    let url = reqwest::Url::parse(callback_url).map_err(|e| BackendError::Callback(e.to_string()))?;
    let source = url
        .fragment()
        .filter(|f| !f.is_empty())
        .or(url.query())
        .unwrap_or_default()
        .to_owned();

    let mut access_token = None;
    let mut refresh_token = None;
    let mut token_type = None;
    let mut expires_in = None;
    let mut expires_at = None;
    let mut error = None;

    for (key, value) in reqwest::Url::parse(&format!("http://callback/?{source}"))
        .map_err(|e| BackendError::Callback(e.to_string()))?
        .query_pairs()
    {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "token_type" => token_type = Some(value.into_owned()),
            "expires_in" => expires_in = value.parse::<i64>().ok(),
            "expires_at" => expires_at = value.parse::<i64>().ok(),
            "error_description" => error = Some(value.into_owned()),
            "error" => {
                if error.is_none() {
                    error = Some(value.into_owned());
                }
            }
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(BackendError::Callback(error));
    }
    let access_token = access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BackendError::Callback("missing access_token".to_owned()))?;

    let expires_at = resolve_expiry(expires_at, expires_in, now, BackendError::Callback)?;

    Ok(CallbackTokens {
        access_token,
        refresh_token,
        token_type: token_type.unwrap_or_else(|| "bearer".to_owned()),
        expires_at,
    })
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
