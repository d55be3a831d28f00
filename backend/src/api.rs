//! Backend contract: the three seams the application talks through.
//!
//! DESIGN
//! ======
//! The application never reaches a transport directly. Identity, the
//! bookmarks table, and the change-feed are each an object-safe async trait
//! so the hosted adapters and in-process test doubles are interchangeable.
//!
//! A change-feed subscription is an owned [`Subscription`] handle. Release
//! runs exactly once: explicitly through [`Subscription::release`] or
//! implicitly when the handle is dropped. A feed may also attach an end
//! signal so the holder learns when the server closed the channel and can
//! subscribe again.

use std::fmt;
use std::sync::Arc;

use frames::ChangeEvent;
use tokio::sync::watch;

use crate::error::BackendError;
use crate::types::{Bookmark, NewBookmark, Session, User};

/// Identity operations of the hosted auth service.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// Current session, if one exists.
    async fn session(&self) -> Result<Option<Session>, BackendError>;

    /// Current user, if the session is valid.
    async fn user(&self) -> Result<Option<User>, BackendError>;

    /// Start the OAuth flow for `provider` and return the URL the caller must
    /// redirect to. Does not change local session state.
    async fn sign_in_with_provider(&self, provider: &str) -> Result<String, BackendError>;

    /// Invalidate the current session.
    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// Row operations on the bookmarks table.
#[async_trait::async_trait]
pub trait BookmarkTable: Send + Sync {
    /// Every row visible to the caller, newest first.
    async fn list(&self) -> Result<Vec<Bookmark>, BackendError>;

    /// Insert one row and return the stored representation.
    async fn insert(&self, bookmark: &NewBookmark) -> Result<Vec<Bookmark>, BackendError>;

    /// Delete the row with `id`.
    async fn delete(&self, id: &str) -> Result<(), BackendError>;
}

/// Callback invoked for every change event on a subscribed table.
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Row-level change notifications.
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Listen for inserts, updates, and deletes on `table`.
    async fn subscribe(&self, table: &str, listener: ChangeListener) -> Result<Subscription, BackendError>;
}

// =============================================================================
// SUBSCRIPTION HANDLE
// =============================================================================

type Release = Box<dyn FnOnce() + Send>;

/// Owned change-feed subscription.
pub struct Subscription {
    topic: String,
    release: Option<Release>,
    ended: Option<watch::Receiver<bool>>,
}

impl Subscription {
    /// Wrap a release action for the subscription on `topic`.
    pub fn new(topic: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self { topic: topic.into(), release: Some(Box::new(release)), ended: None }
    }

    /// Attach the feed's end signal. The channel counts as ended once `true`
    /// is sent or the sender is dropped.
    #[must_use]
    pub fn with_end_signal(mut self, ended: watch::Receiver<bool>) -> Self {
        self.ended = Some(ended);
        self
    }

    /// Channel topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Whether the feed stopped delivering events to this subscription.
    /// Always false without an end signal.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.as_ref().is_some_and(|rx| *rx.borrow() || rx.has_changed().is_err())
    }

    /// Resolve once the feed stops delivering events. Pends forever without
    /// an end signal.
    pub async fn ended(&mut self) {
        match self.ended.as_mut() {
            // A dropped sender ends the channel too.
            Some(rx) => {
                let _ = rx.wait_for(|ended| *ended).await;
            }
            None => std::future::pending().await,
        }
    }

    /// Stop listening. Later calls and the eventual drop are no-ops.
    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::debug!(topic = %self.topic, "releasing change-feed subscription");
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("released", &self.is_released())
            .field("ended", &self.is_ended())
            .finish()
    }
}

// =============================================================================
// SERVICES
// =============================================================================

/// The three backend seams, bundled for injection into view-models.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthApi>,
    pub table: Arc<dyn BookmarkTable>,
    pub feed: Arc<dyn ChangeFeed>,
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
