#[cfg(test)]
#[path = "dashboard_test.rs"]
mod dashboard_test;

use backend::{Bookmark, NewBookmark};

/// Lifecycle of the dashboard view. `Ready` is re-entered after every list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// Everything the dashboard renders: identity, rows, and the two input buffers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashboardState {
    pub phase: Phase,
    pub user_id: Option<String>,
    /// Newest first.
    pub bookmarks: Vec<Bookmark>,
    pub title: String,
    pub url: String,
    /// Number of completed list fetches.
    pub generation: u64,
}

impl DashboardState {
    /// Replace the rows wholesale with a fetch result.
    pub fn replace(&mut self, rows: Vec<Bookmark>) {
        self.bookmarks = rows;
        self.generation += 1;
        self.phase = Phase::Ready;
    }

    /// Put freshly inserted rows on top. Rows a racing refetch already
    /// delivered are skipped. Returns how many rows were added.
    pub fn prepend(&mut self, rows: Vec<Bookmark>) -> usize {
        let fresh: Vec<Bookmark> = rows
            .into_iter()
            .filter(|row| !self.bookmarks.iter().any(|b| b.id == row.id))
            .collect();
        let added = fresh.len();
        self.bookmarks.splice(0..0, fresh);
        added
    }

    pub fn clear_inputs(&mut self) {
        self.title.clear();
        self.url.clear();
    }

    /// Insert payload for the current buffers, if submission is allowed.
    #[must_use]
    pub fn pending(&self) -> Option<NewBookmark> {
        NewBookmark::new(&self.title, &self.url, self.user_id.as_deref()?)
    }
}
