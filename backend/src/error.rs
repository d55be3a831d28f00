//! Errors produced by backend adapters.

/// Errors produced by auth, table, and change-feed operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A required configuration variable is not set.
    #[error("missing config: env var {var} not set")]
    MissingConfig { var: String },

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The HTTP request to the backend failed before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend returned a non-success HTTP status.
    #[error("backend response error: status {status}")]
    Response { status: u16, body: String },

    /// A response body could not be deserialized.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The OAuth return URL did not carry a usable session.
    #[error("invalid sign-in callback: {0}")]
    Callback(String),

    /// The change-feed connection failed or was closed.
    #[error("realtime error: {0}")]
    Realtime(String),

    /// The session could not be read from or written to storage.
    #[error("session store error: {0}")]
    SessionStore(String),
}

impl BackendError {
    /// Whether the backend rejected the caller's credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Response { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Parse(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}
