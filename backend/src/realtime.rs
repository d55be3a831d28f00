//! Hosted change-feed adapter over a websocket.
//!
//! ARCHITECTURE
//! ============
//! One connection task per [`RealtimeFeed`], opened lazily by the first
//! subscribe. Subscribers talk to the task through an unbounded command
//! channel: a join registers the listener under a fresh channel topic, a
//! leave (sent when the [`Subscription`] is released) drops it. Incoming
//! `postgres_changes` frames are routed to the listener of their topic.
//!
//! A token watcher beside each connection polls the auth service once per
//! heartbeat and hands a changed access token to every joined channel, so
//! channels outlive the token they joined with.
//!
//! The task exits when every command sender is gone (feed dropped and all
//! subscriptions released) or the socket closes. A channel the server closes
//! or rejects is dropped and its [`Subscription`] reports ended; the same
//! happens to every channel when the connection dies. Nothing reconnects on
//! its own: the holder subscribes again and the next subscribe dials a new
//! connection if needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use frames::{Frame, ReplyStatus};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::api::{AuthApi, ChangeFeed, ChangeListener, Subscription};
use crate::config::BackendConfig;
use crate::error::BackendError;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Filter applied to every join: all change kinds.
const ALL_EVENTS: &str = "*";

enum Command {
    Join {
        topic: String,
        table: String,
        access_token: Option<String>,
        listener: ChangeListener,
        ended: watch::Sender<bool>,
    },
    Leave {
        topic: String,
    },
    Token {
        token: String,
    },
}

struct Channel {
    join_ref: String,
    listener: ChangeListener,
    ended: watch::Sender<bool>,
}

impl Channel {
    fn end(&self) {
        self.ended.send_replace(true);
    }
}

pub struct RealtimeFeed {
    config: BackendConfig,
    auth: Arc<dyn AuthApi>,
    connection: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    next_channel: AtomicU64,
}

impl RealtimeFeed {
    #[must_use]
    pub fn new(config: BackendConfig, auth: Arc<dyn AuthApi>) -> Self {
        Self { config, auth, connection: Mutex::new(None), next_channel: AtomicU64::new(1) }
    }

    /// Live command sender, dialing a new connection if there is none.
    async fn commands(&self) -> Result<mpsc::UnboundedSender<Command>, BackendError> {
        let mut connection = self.connection.lock().await;
        if let Some(tx) = connection.as_ref().filter(|tx| !tx.is_closed()) {
            return Ok(tx.clone());
        }

        let url = self.config.realtime_url()?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| BackendError::Realtime(format!("connect failed: {e}")))?;
        tracing::info!(url = %redact_key(&url), "change-feed connected");

        let (tx, rx) = mpsc::unbounded_channel();
        let heartbeat = Duration::from_secs(self.config.heartbeat_secs.max(1));
        tokio::spawn(run_connection(stream, rx, self.config.schema.clone(), heartbeat));
        tokio::spawn(watch_token(tx.downgrade(), Arc::clone(&self.auth), heartbeat));
        *connection = Some(tx.clone());
        Ok(tx)
    }
}

#[async_trait::async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, table: &str, listener: ChangeListener) -> Result<Subscription, BackendError> {
        let access_token = match self.auth.session().await {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                tracing::debug!(error = %e, "session lookup failed; joining without token");
                None
            }
        };
        let tx = self.commands().await?;
        let n = self.next_channel.fetch_add(1, Ordering::Relaxed);
        let topic = format!("realtime:{table}-changes-{n}");

        let (ended, ended_rx) = watch::channel(false);
        tx.send(Command::Join { topic: topic.clone(), table: table.to_owned(), access_token, listener, ended })
            .map_err(|_| BackendError::Realtime("connection closed".to_owned()))?;

        let leave_topic = topic.clone();
        let subscription = Subscription::new(topic, move || {
            // A closed connection has nothing left to leave.
            let _ = tx.send(Command::Leave { topic: leave_topic });
        });
        Ok(subscription.with_end_signal(ended_rx))
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

async fn run_connection(
    stream: WsStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
    schema: String,
    heartbeat_every: Duration,
) {
    let (mut sink, mut source) = stream.split();
    let mut channels: HashMap<String, Channel> = HashMap::new();
    let mut current_token: Option<String> = None;
    let mut next_ref: u64 = 0;
    let mut make_ref = move || {
        next_ref += 1;
        next_ref.to_string()
    };

    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat_every, heartbeat_every);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    'connection: loop {
        let outgoing: Vec<Frame> = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Join { topic, table, access_token, listener, ended }) => {
                    let join_ref = make_ref();
                    let config = frames::postgres_changes_config(&schema, &table, ALL_EVENTS);
                    let frame = frames::join_frame(&topic, &join_ref, config, access_token.as_deref());
                    tracing::debug!(%topic, %table, "joining change-feed channel");
                    if access_token.is_some() {
                        current_token = access_token;
                    }
                    channels.insert(topic, Channel { join_ref, listener, ended });
                    vec![frame]
                }
                Some(Command::Leave { topic }) => channels
                    .remove(&topic)
                    .map(|channel| {
                        tracing::debug!(%topic, "leaving change-feed channel");
                        frames::leave_frame(&topic, &make_ref(), Some(&channel.join_ref))
                    })
                    .into_iter()
                    .collect(),
                Some(Command::Token { token }) => {
                    if current_token.as_deref() == Some(token.as_str()) {
                        Vec::new()
                    } else {
                        tracing::debug!(channels = channels.len(), "pushing refreshed access token");
                        let pushes = channels
                            .iter()
                            .map(|(topic, channel)| {
                                frames::access_token_frame(topic, &make_ref(), Some(&channel.join_ref), &token)
                            })
                            .collect();
                        current_token = Some(token);
                        pushes
                    }
                }
                None => break,
            },
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    dispatch(text.as_str(), &mut channels);
                    Vec::new()
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::warn!(channels = channels.len(), "change-feed connection closed");
                    break;
                }
                Some(Ok(_)) => Vec::new(),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "change-feed connection failed");
                    break;
                }
            },
            _ = heartbeat.tick() => vec![frames::heartbeat_frame(&make_ref())],
        };

        for frame in outgoing {
            if let Err(e) = sink.send(Message::Text(frames::encode_frame(&frame).into())).await {
                tracing::warn!(error = %e, event = %frame.event, "change-feed send failed");
                break 'connection;
            }
        }
    }

    for channel in channels.values() {
        channel.end();
    }
    let _ = sink.close().await;
    tracing::debug!("change-feed connection task finished");
}

fn dispatch(text: &str, channels: &mut HashMap<String, Channel>) {
    let frame = match frames::decode_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring undecodable change-feed frame");
            return;
        }
    };

    if let Some(change) = frame.change_event() {
        if let Some(channel) = channels.get(&frame.topic) {
            (channel.listener)(&change);
        }
        return;
    }

    match frame.event.as_str() {
        frames::event::REPLY if frame.reply_status() == Some(ReplyStatus::Error) => {
            tracing::warn!(topic = %frame.topic, payload = %frame.payload, "change-feed request rejected");
            // Only a rejected join leaves the channel dead.
            let rejected_join = channels
                .get(&frame.topic)
                .is_some_and(|channel| frame.reference.as_deref() == Some(channel.join_ref.as_str()));
            if rejected_join {
                end_channel(channels, &frame.topic);
            }
        }
        frames::event::ERROR | frames::event::CLOSE => {
            tracing::warn!(topic = %frame.topic, event = %frame.event, "change-feed channel ended");
            end_channel(channels, &frame.topic);
        }
        frames::event::SYSTEM => log_system(&frame),
        _ => {}
    }
}

fn end_channel(channels: &mut HashMap<String, Channel>, topic: &str) {
    if let Some(channel) = channels.remove(topic) {
        channel.end();
    }
}

fn log_system(frame: &Frame) {
    let status = frame.payload.get("status").and_then(serde_json::Value::as_str).unwrap_or("");
    if status == "error" {
        tracing::warn!(topic = %frame.topic, payload = %frame.payload, "change-feed system error");
    } else {
        tracing::debug!(topic = %frame.topic, payload = %frame.payload, "change-feed system message");
    }
}

// =============================================================================
// TOKEN WATCHER
// =============================================================================

/// Poll the session every `every` and forward a changed access token to the
/// connection. Exits once the connection task is gone.
async fn watch_token(commands: mpsc::WeakUnboundedSender<Command>, auth: Arc<dyn AuthApi>, every: Duration) {
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut forwarded: Option<String> = None;

    loop {
        ticks.tick().await;
        let Some(tx) = commands.upgrade().filter(|tx| !tx.is_closed()) else { break };

        let token = match auth.session().await {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                tracing::debug!(error = %e, "session lookup failed; keeping current token");
                continue;
            }
        };
        let Some(token) = token.filter(|t| forwarded.as_deref() != Some(t.as_str())) else { continue };
        if tx.send(Command::Token { token: token.clone() }).is_err() {
            break;
        }
        forwarded = Some(token);
    }
    tracing::debug!("change-feed token watcher finished");
}

/// Strip the api key from a realtime URL before logging it.
fn redact_key(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?apikey=…"),
        None => url.to_owned(),
    }
}

#[cfg(test)]
#[path = "realtime_test.rs"]
mod tests;
