//! In-process backend and navigator doubles for view-model tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backend::{
    AuthApi, BackendError, Bookmark, BookmarkTable, ChangeEvent, ChangeFeed, ChangeKind, ChangeListener, NewBookmark,
    Services, Session, Subscription, User,
};
use tokio::sync::watch;

use crate::nav::{Navigator, Route};
use crate::state::dashboard::DashboardState;

type Listeners = Arc<Mutex<Vec<(u64, ChangeListener)>>>;

/// Auth, table, and change-feed in one object. Rows are listed newest first
/// by insert order; every committed write is announced to live listeners.
#[derive(Default)]
pub(crate) struct MockBackend {
    user: Mutex<Option<User>>,
    rows: Mutex<Vec<(u64, Bookmark)>>,
    seq: AtomicU64,
    listeners: Listeners,
    next_listener: AtomicU64,
    ends: Mutex<Vec<watch::Sender<bool>>>,
    insert_delays: Mutex<HashMap<String, Duration>>,
    list_delay: Mutex<Option<Duration>>,

    pub list_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,

    pub fail_session: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub fail_sign_in: AtomicBool,
    pub fail_sign_out: AtomicBool,
}

fn unavailable() -> BackendError {
    BackendError::Response { status: 503, body: "unavailable".to_owned() }
}

impl MockBackend {
    pub(crate) fn signed_in(user_id: &str) -> Arc<Self> {
        let mock = Self::default();
        *mock.user.lock().unwrap() = Some(User { id: user_id.to_owned(), email: None });
        Arc::new(mock)
    }

    pub(crate) fn signed_out() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn services(self: &Arc<Self>) -> Services {
        Services { auth: self.clone(), table: self.clone(), feed: self.clone() }
    }

    pub(crate) fn seed(&self, title: &str) -> Bookmark {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let row = row(seq, title, &format!("https://{title}.example.com"), "u-1");
        self.rows.lock().unwrap().push((seq, row.clone()));
        row
    }

    pub(crate) fn delay_insert(&self, title: &str, delay: Duration) {
        self.insert_delays.lock().unwrap().insert(title.to_owned(), delay);
    }

    pub(crate) fn delay_list(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn active_listeners(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Close every open channel from the server side.
    pub(crate) fn end_feed(&self) {
        self.listeners.lock().unwrap().clear();
        for ended in self.ends.lock().unwrap().drain(..) {
            ended.send_replace(true);
        }
    }

    /// Deliver a change event to every live listener.
    pub(crate) fn emit(&self, kind: ChangeKind) {
        let live: Vec<ChangeListener> = self.listeners.lock().unwrap().iter().map(|(_, l)| Arc::clone(l)).collect();
        let change = ChangeEvent {
            kind,
            schema: "public".to_owned(),
            table: "bookmarks".to_owned(),
            commit_timestamp: None,
        };
        for listener in live {
            listener(&change);
        }
    }
}

fn row(seq: u64, title: &str, url: &str, user_id: &str) -> Bookmark {
    Bookmark {
        id: format!("b{seq}"),
        title: title.to_owned(),
        url: url.to_owned(),
        user_id: Some(user_id.to_owned()),
        created_at: None,
    }
}

#[async_trait::async_trait]
impl AuthApi for MockBackend {
    async fn session(&self) -> Result<Option<Session>, BackendError> {
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.user.lock().unwrap().clone().map(|user| Session {
            access_token: "tok".to_owned(),
            refresh_token: None,
            token_type: "bearer".to_owned(),
            expires_at: None,
            user,
        }))
    }

    async fn user(&self) -> Result<Option<User>, BackendError> {
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.user.lock().unwrap().clone())
    }

    async fn sign_in_with_provider(&self, provider: &str) -> Result<String, BackendError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(format!("https://auth.example.com/authorize?provider={provider}"))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        *self.user.lock().unwrap() = None;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BookmarkTable for MockBackend {
    async fn list(&self) -> Result<Vec<Bookmark>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    async fn insert(&self, bookmark: &NewBookmark) -> Result<Vec<Bookmark>, BackendError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        // Ordering is fixed when the request arrives, not when it commits.
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.insert_delays.lock().unwrap().get(&bookmark.title).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Response { status: 403, body: "denied".to_owned() });
        }
        let stored = row(seq, &bookmark.title, &bookmark.url, &bookmark.user_id);
        self.rows.lock().unwrap().push((seq, stored.clone()));
        self.emit(ChangeKind::Insert);
        Ok(vec![stored])
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Response { status: 403, body: "denied".to_owned() });
        }
        self.rows.lock().unwrap().retain(|(_, row)| row.id != id);
        self.emit(ChangeKind::Delete);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChangeFeed for MockBackend {
    async fn subscribe(&self, table: &str, listener: ChangeListener) -> Result<Subscription, BackendError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BackendError::Realtime("feed down".to_owned()));
        }
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));

        let (ended, ended_rx) = watch::channel(false);
        self.ends.lock().unwrap().push(ended);

        let listeners = Arc::clone(&self.listeners);
        let subscription = Subscription::new(format!("realtime:{table}-changes-{id}"), move || {
            listeners.lock().unwrap().retain(|(live, _)| *live != id);
        });
        Ok(subscription.with_end_signal(ended_rx))
    }
}

/// Navigator that records every destination.
#[derive(Default)]
pub(crate) struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub(crate) fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().unwrap().push(route);
    }
}

/// Wait until the watched state satisfies `done`, failing after five seconds.
pub(crate) async fn settle(
    rx: &mut watch::Receiver<DashboardState>,
    done: impl FnMut(&DashboardState) -> bool,
) -> DashboardState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(done))
        .await
        .expect("timed out waiting for dashboard state")
        .expect("dashboard dropped")
        .clone()
}

pub(crate) fn titles(state: &DashboardState) -> Vec<String> {
    state.bookmarks.iter().map(|b| b.title.clone()).collect()
}
