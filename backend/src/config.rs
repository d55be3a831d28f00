//! Backend configuration parsed from environment variables.

use crate::error::BackendError;

pub const DEFAULT_OAUTH_PROVIDER: &str = "google";
pub const DEFAULT_BOOKMARKS_TABLE: &str = "bookmarks";
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// Realtime protocol version requested on connect.
const REALTIME_VSN: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL without a trailing slash.
    pub url: String,
    /// Public API key sent with every request.
    pub anon_key: String,
    pub oauth_provider: String,
    /// Where the auth service should send the browser after sign-in.
    pub redirect_to: Option<String>,
    pub table: String,
    pub schema: String,
    pub timeouts: Timeouts,
    pub heartbeat_secs: u64,
}

impl BackendConfig {
    /// Build a config with defaults for everything but the endpoint and key.
    #[must_use]
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            anon_key: anon_key.to_owned(),
            oauth_provider: DEFAULT_OAUTH_PROVIDER.to_owned(),
            redirect_to: None,
            table: DEFAULT_BOOKMARKS_TABLE.to_owned(),
            schema: DEFAULT_SCHEMA.to_owned(),
            timeouts: Timeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }

    /// Build typed backend config from environment variables.
    ///
    /// Required:
    /// - `BACKEND_URL`
    /// - `BACKEND_ANON_KEY`
    ///
    /// Optional:
    /// - `OAUTH_PROVIDER`: default `google`
    /// - `OAUTH_REDIRECT_TO`
    /// - `BOOKMARKS_TABLE`: default `bookmarks`
    /// - `BACKEND_SCHEMA`: default `public`
    /// - `BACKEND_REQUEST_TIMEOUT_SECS`: default 30
    /// - `BACKEND_CONNECT_TIMEOUT_SECS`: default 10
    /// - `REALTIME_HEARTBEAT_SECS`: default 25
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::MissingConfig`] for a missing required
    /// variable and [`BackendError::ConfigParse`] for a URL without an
    /// `http`/`https` scheme.
    pub fn from_env() -> Result<Self, BackendError> {
        let url = required("BACKEND_URL")?;
        let anon_key = required("BACKEND_ANON_KEY")?;
        Self::from_parts(&url, &anon_key)
    }

    /// [`BackendConfig::from_env`] with the endpoint and key supplied by the
    /// caller; the optional variables are still read from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ConfigParse`] for a URL without an
    /// `http`/`https` scheme.
    pub fn from_parts(url: &str, anon_key: &str) -> Result<Self, BackendError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BackendError::ConfigParse(format!("BACKEND_URL must be http(s): {url}")));
        }

        let mut config = Self::new(url, anon_key);
        if let Some(provider) = optional("OAUTH_PROVIDER") {
            config.oauth_provider = provider;
        }
        config.redirect_to = optional("OAUTH_REDIRECT_TO");
        if let Some(table) = optional("BOOKMARKS_TABLE") {
            config.table = table;
        }
        if let Some(schema) = optional("BACKEND_SCHEMA") {
            config.schema = schema;
        }
        config.timeouts = Timeouts {
            request_secs: env_parse_u64("BACKEND_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("BACKEND_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        config.heartbeat_secs = env_parse_u64("REALTIME_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_SECS);
        Ok(config)
    }

    /// Auth service endpoint, e.g. `auth_url("user")`.
    #[must_use]
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path.trim_start_matches('/'))
    }

    /// REST endpoint for `table`.
    #[must_use]
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }

    /// Websocket endpoint of the change-feed, with the anon key
    /// percent-encoded into the query.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ConfigParse`] if the base URL does not parse.
    pub fn realtime_url(&self) -> Result<String, BackendError> {
        let base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.url.clone()
        };
        reqwest::Url::parse_with_params(
            &format!("{base}/realtime/v1/websocket"),
            &[("apikey", self.anon_key.as_str()), ("vsn", REALTIME_VSN)],
        )
        .map(String::from)
        .map_err(|e| BackendError::ConfigParse(format!("realtime url: {e}")))
    }
}

fn required(key: &str) -> Result<String, BackendError> {
    optional(key).ok_or_else(|| BackendError::MissingConfig { var: key.to_owned() })
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
