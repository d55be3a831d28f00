//! Row and identity types shared by the backend contract and its adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// BOOKMARK
// =============================================================================

/// One row of the bookmarks table. Never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Opaque id generated by the backend.
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub title: String,
    pub url: String,
    /// Owner identity. Ownership is enforced by the backend's access policy.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Only used for ordering; never displayed.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBookmark {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

impl NewBookmark {
    /// Build an insert payload, or `None` when any field is empty.
    #[must_use]
    pub fn new(title: &str, url: &str, user_id: &str) -> Option<Self> {
        if title.is_empty() || url.is_empty() || user_id.is_empty() {
            return None;
        }
        Some(Self { title: title.to_owned(), url: url.to_owned(), user_id: user_id.to_owned() })
    }
}

/// Numeric and uuid primary keys both arrive as strings in the client.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unsupported id value: {other}"))),
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Proof of authenticated identity issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Absolute expiry in unix seconds, if the service reported one.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

/// Sessions are treated as expired this many seconds early.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

impl Session {
    /// Whether the access token should no longer be used at `now` (unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at.saturating_sub(EXPIRY_MARGIN_SECS) <= now)
    }

    /// [`Session::is_expired_at`] against the wall clock.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
