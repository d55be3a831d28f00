//! Navigation seam between the two screens.

use std::sync::Mutex;

/// The two screens of the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/",
            Self::Dashboard => "/dashboard",
        }
    }
}

/// Moves the user to another screen. Implemented by whatever hosts the views.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only remembers where it was last sent, for hosts that act
/// on the destination after a view operation returns.
#[derive(Debug, Default)]
pub struct LastRoute {
    route: Mutex<Option<Route>>,
}

impl LastRoute {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination of the most recent navigation, clearing it.
    pub fn take(&self) -> Option<Route> {
        self.route.lock().ok().and_then(|mut route| route.take())
    }
}

impl Navigator for LastRoute {
    fn navigate(&self, route: Route) {
        tracing::debug!(path = route.path(), "navigate");
        if let Ok(mut current) = self.route.lock() {
            *current = Some(route);
        }
    }
}

#[cfg(test)]
#[path = "nav_test.rs"]
mod tests;
