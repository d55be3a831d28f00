//! # backend
//!
//! Contract and hosted adapters for the services the bookmark manager runs
//! on: an auth service with OAuth sign-in, a bookmarks table behind a REST
//! row API, and a realtime change-feed.
//!
//! The application depends only on the traits in [`api`]. [`connect`] wires
//! the hosted adapters into a [`Services`] bundle.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
mod http;
pub mod realtime;
pub mod rest;
pub mod session_store;
pub mod types;

use std::sync::Arc;

pub use api::{AuthApi, BookmarkTable, ChangeFeed, ChangeListener, Services, Subscription};
pub use auth::HostedAuth;
pub use config::BackendConfig;
pub use error::BackendError;
pub use frames::{ChangeEvent, ChangeKind};
pub use realtime::RealtimeFeed;
pub use rest::HostedTable;
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use types::{Bookmark, NewBookmark, Session, User};

/// Hosted adapters sharing one auth instance.
pub struct Hosted {
    pub auth: Arc<HostedAuth>,
    pub services: Services,
}

/// Build the hosted adapters for `config`.
///
/// # Errors
///
/// Returns an error if an HTTP client cannot be built.
pub fn connect(config: BackendConfig, store: Arc<dyn SessionStore>) -> Result<Hosted, BackendError> {
    let auth = Arc::new(HostedAuth::new(config.clone(), store)?);
    let auth_api: Arc<dyn AuthApi> = auth.clone();
    let table = Arc::new(HostedTable::new(config.clone(), Arc::clone(&auth_api))?);
    let feed = Arc::new(RealtimeFeed::new(config, Arc::clone(&auth_api)));
    tracing::debug!("hosted backend adapters ready");

    Ok(Hosted { auth, services: Services { auth: auth_api, table, feed } })
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
pub(crate) fn test_env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
