//! Dashboard view-model: the signed-in user's bookmarks, kept live.
//!
//! ARCHITECTURE
//! ============
//! State sits in a `watch` channel so any host can render from a receiver.
//! While mounted the dashboard owns two resources: a change-feed
//! [`Subscription`] and the refetch worker the subscription's listener
//! signals. Both are released together by [`Dashboard::teardown`], which
//! also runs before every re-initialize and on drop, so at most one
//! subscription is live per dashboard.
//!
//! The feed may end a subscription on its own (channel closed by the
//! server, connection lost). The view then stops being live and
//! [`Dashboard::feed_ended`] resolves so the host can initialize again.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns an error. Backend failures are logged and leave
//! the view usable: a failed list shows no rows, a failed add keeps the
//! typed input, a failed delete changes nothing, and a failed sign-out
//! still leaves the dashboard.

use std::sync::Arc;

use backend::config::DEFAULT_BOOKMARKS_TABLE;
use backend::{Bookmark, ChangeEvent, ChangeListener, Services, Subscription};
use tokio::sync::watch;

use crate::nav::{Navigator, Route};
use crate::refetch::{self, Refetcher};
use crate::state::dashboard::{DashboardState, Phase};

/// Result of mounting the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    /// No identity; the user was sent to the login screen.
    Redirected,
    /// Rows are listed and the view is live.
    Ready,
}

/// Result of submitting the input buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// A buffer was empty or nobody is signed in. No request was made.
    Skipped,
    Added(Vec<Bookmark>),
    Failed,
}

/// Resources held between initialize and teardown. Field order is drop
/// order: stop listening before stopping the worker.
struct Mount {
    subscription: Option<Subscription>,
    refetcher: Refetcher,
}

pub struct Dashboard {
    services: Services,
    navigator: Arc<dyn Navigator>,
    table: String,
    state: Arc<watch::Sender<DashboardState>>,
    mount: Option<Mount>,
}

impl Dashboard {
    #[must_use]
    pub fn new(services: Services, navigator: Arc<dyn Navigator>) -> Self {
        let (state, _) = watch::channel(DashboardState::default());
        Self {
            services,
            navigator,
            table: DEFAULT_BOOKMARKS_TABLE.to_owned(),
            state: Arc::new(state),
            mount: None,
        }
    }

    /// Watch change events on `table` instead of the default.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Snapshot of the current view state.
    #[must_use]
    pub fn state(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<DashboardState> {
        self.state.subscribe()
    }

    /// Whether a change-feed subscription is held and still delivering.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.mount.as_ref().and_then(|m| m.subscription.as_ref()).is_some_and(|s| !s.is_ended())
    }

    /// Resolve once the mounted subscription stops delivering changes.
    /// Pends forever while unmounted or mounted without a feed.
    pub async fn feed_ended(&mut self) {
        match self.mount.as_mut().and_then(|m| m.subscription.as_mut()) {
            Some(subscription) => subscription.ended().await,
            None => std::future::pending().await,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Resolve the user, list their bookmarks, then start listening for
    /// changes. Any previous mount is torn down first.
    pub async fn initialize(&mut self) -> InitOutcome {
        self.teardown();

        let user = match self.services.auth.user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!("no signed-in user; leaving dashboard");
                self.navigator.navigate(Route::Login);
                return InitOutcome::Redirected;
            }
            Err(e) => {
                tracing::debug!(error = %e, "user lookup failed; leaving dashboard");
                self.navigator.navigate(Route::Login);
                return InitOutcome::Redirected;
            }
        };

        tracing::info!(user_id = %user.id, "dashboard mounted");
        self.state.send_modify(|s| {
            s.user_id = Some(user.id);
            s.phase = Phase::Loading;
        });
        self.list().await;

        let refetcher = Refetcher::spawn(Arc::clone(&self.services.table), Arc::clone(&self.state));
        let token = refetcher.token();
        let listener: ChangeListener = Arc::new(move |change: &ChangeEvent| {
            tracing::debug!(kind = ?change.kind, table = %change.table, "bookmark change received");
            token.invalidate();
        });
        let subscription = match self.services.feed.subscribe(&self.table, listener).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(error = %e, table = %self.table, "change-feed unavailable; view will not live-update");
                None
            }
        };

        self.mount = Some(Mount { subscription, refetcher });
        InitOutcome::Ready
    }

    /// Release the subscription and stop the refetch worker. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut mount) = self.mount.take() {
            if let Some(subscription) = mount.subscription.as_mut() {
                subscription.release();
            }
            mount.refetcher.stop();
            tracing::debug!("dashboard torn down");
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Fetch every row and replace the listed rows. A failure lists nothing.
    pub async fn list(&self) {
        refetch::refresh(self.services.table.as_ref(), &self.state).await;
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.state.send_modify(|s| s.title = title);
    }

    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.state.send_modify(|s| s.url = url);
    }

    /// Submit the input buffers as a new bookmark. On success the stored
    /// rows go on top and the buffers are cleared; on failure both are kept.
    pub async fn add(&self) -> AddOutcome {
        let pending = self.state.borrow().pending();
        let Some(bookmark) = pending else {
            tracing::debug!("add skipped: empty input or no user");
            return AddOutcome::Skipped;
        };

        match self.services.table.insert(&bookmark).await {
            Ok(rows) => {
                let stored = rows.clone();
                let mut added = 0;
                self.state.send_modify(|s| {
                    added = s.prepend(stored);
                    s.clear_inputs();
                });
                tracing::info!(title = %bookmark.title, added, "bookmark added");
                AddOutcome::Added(rows)
            }
            Err(e) => {
                tracing::error!(error = %e, title = %bookmark.title, "failed to add bookmark");
                AddOutcome::Failed
            }
        }
    }

    /// Delete the row with `id`. The list updates through the change-feed.
    pub async fn delete(&self, id: &str) {
        match self.services.table.delete(id).await {
            Ok(()) => tracing::info!(%id, "bookmark deleted"),
            Err(e) => tracing::error!(error = %e, %id, "failed to delete bookmark"),
        }
    }

    /// Sign out and return to the login screen, whether or not the backend
    /// accepted the sign-out.
    pub async fn logout(&mut self) {
        if let Err(e) = self.services.auth.sign_out().await {
            tracing::warn!(error = %e, "sign-out failed; leaving dashboard anyway");
        }
        self.teardown();
        self.state.send_replace(DashboardState::default());
        self.navigator.navigate(Route::Login);
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "dashboard_test.rs"]
mod tests;
