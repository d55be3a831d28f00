//! Single-flight bookmark refetch driven by change-feed invalidations.
//!
//! DESIGN
//! ======
//! Feed listeners never touch view state. They hand an [`InvalidationToken`]
//! signal to one worker task that owns the refetch. The signal is a
//! `Notify` permit, so a burst of events collapses into at most one fetch
//! queued behind the one in flight. Each fetch replaces the rows wholesale;
//! when an explicit list races a feed-triggered one, the last to complete
//! wins.

use std::sync::Arc;

use backend::BookmarkTable;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::state::dashboard::DashboardState;

/// Signal that the listed rows may be stale. Cheap to clone.
#[derive(Clone, Debug)]
pub struct InvalidationToken(Arc<Notify>);

impl InvalidationToken {
    pub fn invalidate(&self) {
        self.0.notify_one();
    }
}

/// Owns the refetch worker. Dropping it stops the worker.
pub(crate) struct Refetcher {
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Refetcher {
    pub(crate) fn spawn(table: Arc<dyn BookmarkTable>, state: Arc<watch::Sender<DashboardState>>) -> Self {
        let notify = Arc::new(Notify::new());
        let signal = Arc::clone(&notify);
        let task = tokio::spawn(async move {
            loop {
                signal.notified().await;
                tracing::debug!("bookmarks invalidated; refetching");
                refresh(table.as_ref(), &state).await;
            }
        });
        Self { notify, task }
    }

    pub(crate) fn token(&self) -> InvalidationToken {
        InvalidationToken(Arc::clone(&self.notify))
    }

    pub(crate) fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Refetcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fetch every visible row and replace the listed rows with the result.
/// A failed fetch counts as an empty result.
pub(crate) async fn refresh(table: &dyn BookmarkTable, state: &watch::Sender<DashboardState>) {
    let rows = match table.list().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "failed to fetch bookmarks");
            Vec::new()
        }
    };
    let count = rows.len();
    state.send_modify(|s| s.replace(rows));
    tracing::debug!(count, "bookmarks listed");
}

#[cfg(test)]
#[path = "refetch_test.rs"]
mod tests;
