//! Websocket change feed
//!
//! Joins one realtime channel per subscription and keeps it alive:
//! heartbeats on the `phoenix` topic, reconnect with exponential backoff
//! after a loss, and a [`FeedEvent::Resync`] once the channel is rejoined so
//! the consumer refetches whatever it missed while disconnected.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::protocol::{Inbound, PhoenixMessage};
use super::{ChangeFeed, ChangeFilter, EVENT_BUFFER, FeedEvent, Forward, Subscription, forward};
use crate::config::{ClientConfig, RealtimeConfig};
use crate::error::{DataAccessError, DataResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Grace period for the leave / close handshake on shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Change feed over the store's realtime websocket
#[derive(Debug, Clone)]
pub struct RealtimeChangeFeed {
    url: Url,
    access_token: String,
    settings: RealtimeConfig,
}

impl RealtimeChangeFeed {
    pub fn new(config: &ClientConfig) -> DataResult<Self> {
        Ok(Self {
            url: config.realtime_url()?,
            access_token: config.bearer_token().to_string(),
            settings: config.realtime.clone(),
        })
    }

    /// Connect and join the filter's channel, bounded by the connect timeout
    async fn open_channel(&self, filter: &ChangeFilter, refs: &mut Refs) -> DataResult<WsStream> {
        let limit = self.settings.connect_timeout;
        let ws = timeout(limit, self.join_channel(filter, refs))
            .await
            .map_err(|_| {
                DataAccessError::Timeout(format!(
                    "Joining {} took longer than {:?}",
                    filter.topic(),
                    limit
                ))
            })??;

        tracing::info!(topic = %filter.topic(), tables = ?filter.tables, "Realtime channel joined");
        Ok(ws)
    }

    /// Send `phx_join` and wait for the matching reply
    async fn join_channel(&self, filter: &ChangeFilter, refs: &mut Refs) -> DataResult<WsStream> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| DataAccessError::realtime(format!("Connect failed: {e}")))?;

        let join_ref = refs.next();
        send(&mut ws, &PhoenixMessage::join(filter, &self.access_token, &join_ref)).await?;

        let topic = filter.topic();
        loop {
            let text = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(DataAccessError::realtime("Connection closed during join"));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(DataAccessError::realtime(format!("Join failed: {e}")));
                }
            };

            let Ok(message) = PhoenixMessage::from_text(&text) else {
                tracing::warn!("Ignoring unreadable realtime frame during join");
                continue;
            };
            match message.classify(&topic) {
                Inbound::Reply {
                    msg_ref,
                    ok,
                    response,
                } if msg_ref.as_deref() == Some(join_ref.as_str()) => {
                    if ok {
                        return Ok(ws);
                    }
                    return Err(DataAccessError::realtime(format!(
                        "Join rejected: {response}"
                    )));
                }
                Inbound::ChannelError(reason) => {
                    return Err(DataAccessError::realtime(format!("Join failed: {reason}")));
                }
                _ => {}
            }
        }
    }

    /// Reopen the channel with backoff; `None` when giving up or cancelled
    async fn reconnect(
        &self,
        filter: &ChangeFilter,
        refs: &mut Refs,
        token: &CancellationToken,
    ) -> Option<WsStream> {
        let max_attempts = self.settings.max_reconnect_attempts;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if max_attempts > 0 && attempt > max_attempts {
                tracing::error!(
                    attempts = max_attempts,
                    topic = %filter.topic(),
                    "Giving up on realtime channel"
                );
                return None;
            }

            let delay = self.settings.backoff(attempt);
            tracing::info!(attempt, ?delay, "Reconnecting realtime channel");
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = sleep(delay) => {}
            }

            let opened = tokio::select! {
                _ = token.cancelled() => return None,
                opened = self.open_channel(filter, refs) => opened,
            };
            match opened {
                Ok(ws) => return Some(ws),
                Err(e) => tracing::warn!(attempt, "Reconnect failed: {}", e),
            }
        }
    }

    /// Subscription task: drive the joined channel until cancelled, the
    /// subscriber goes away, or reconnecting is given up
    async fn run_channel(
        self,
        mut ws: WsStream,
        filter: ChangeFilter,
        mut refs: Refs,
        tx: mpsc::Sender<FeedEvent>,
        token: CancellationToken,
    ) {
        let topic = filter.topic();

        loop {
            match self.drive(&mut ws, &filter, &mut refs, &tx, &token).await {
                Exit::Cancelled | Exit::SubscriberGone => {
                    leave(&mut ws, &topic, &mut refs).await;
                    break;
                }
                Exit::Lost(reason) => {
                    tracing::warn!(topic = %topic, "Realtime connection lost: {}", reason);
                    if !self.settings.auto_reconnect {
                        break;
                    }
                    match self.reconnect(&filter, &mut refs, &token).await {
                        Some(rejoined) => {
                            ws = rejoined;
                            if let Forward::SubscriberGone = forward(&tx, FeedEvent::Resync) {
                                leave(&mut ws, &topic, &mut refs).await;
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::debug!(topic = %topic, "Realtime subscription closed");
    }

    /// Pump one connection
    async fn drive(
        &self,
        ws: &mut WsStream,
        filter: &ChangeFilter,
        refs: &mut Refs,
        tx: &mpsc::Sender<FeedEvent>,
        token: &CancellationToken,
    ) -> Exit {
        let topic = filter.topic();
        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending_heartbeat: Option<String> = None;

        loop {
            tokio::select! {
                _ = token.cancelled() => return Exit::Cancelled,
                _ = tx.closed() => return Exit::SubscriberGone,

                _ = heartbeat.tick() => {
                    if pending_heartbeat.is_some() {
                        return Exit::Lost("heartbeat not acknowledged".to_string());
                    }
                    let msg_ref = refs.next();
                    if let Err(e) = send(ws, &PhoenixMessage::heartbeat(&msg_ref)).await {
                        return Exit::Lost(e.to_string());
                    }
                    pending_heartbeat = Some(msg_ref);
                }

                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message = match PhoenixMessage::from_text(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::warn!("Ignoring unreadable realtime frame: {}", e);
                                continue;
                            }
                        };
                        match message.classify(&topic) {
                            Inbound::Reply { msg_ref, .. } => {
                                if msg_ref.is_some() && msg_ref == pending_heartbeat {
                                    pending_heartbeat = None;
                                }
                            }
                            Inbound::Change(event) if filter.matches(&event) => {
                                tracing::debug!(
                                    table = %event.table,
                                    kind = %event.kind,
                                    "Change notification received"
                                );
                                match forward(tx, FeedEvent::Change(event)) {
                                    Forward::SubscriberGone => return Exit::SubscriberGone,
                                    Forward::Coalesced => {
                                        tracing::debug!("Subscriber busy, change coalesced");
                                    }
                                    Forward::Delivered => {}
                                }
                            }
                            Inbound::Unreadable(_) => {
                                // Cannot tell which table changed, refetch anyway
                                if let Forward::SubscriberGone = forward(tx, FeedEvent::Resync) {
                                    return Exit::SubscriberGone;
                                }
                            }
                            Inbound::ChannelError(reason) => return Exit::Lost(reason),
                            Inbound::ChannelClosed => {
                                return Exit::Lost("channel closed by server".to_string());
                            }
                            Inbound::Change(_) | Inbound::Other => {}
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Queued pong goes out on flush
                        if let Err(e) = ws.flush().await {
                            return Exit::Lost(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Exit::Lost("socket closed by server".to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Lost(e.to_string()),
                    None => return Exit::Lost("socket stream ended".to_string()),
                },
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeChangeFeed {
    async fn subscribe(&self, filter: &ChangeFilter) -> DataResult<Subscription> {
        let mut refs = Refs::default();
        let ws = self.open_channel(filter, &mut refs).await?;

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().run_channel(
            ws,
            filter.clone(),
            refs,
            tx,
            cancel.clone(),
        ));

        Ok(Subscription::new(events, cancel, task))
    }
}

/// Why a connection stopped being driven
enum Exit {
    Cancelled,
    SubscriberGone,
    Lost(String),
}

/// Message reference counter, shared by every connection of a subscription
#[derive(Debug, Default)]
struct Refs(u64);

impl Refs {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

async fn send(ws: &mut WsStream, message: &PhoenixMessage) -> DataResult<()> {
    ws.send(Message::Text(message.to_text()?))
        .await
        .map_err(|e| DataAccessError::realtime(format!("Send failed: {e}")))
}

/// Best-effort `phx_leave` followed by a close frame
async fn leave(ws: &mut WsStream, topic: &str, refs: &mut Refs) {
    let goodbye = async {
        let _ = send(ws, &PhoenixMessage::leave(topic, &refs.next())).await;
        let _ = ws.close(None).await;
    };
    if timeout(CLOSE_TIMEOUT, goodbye).await.is_err() {
        tracing::debug!(topic = %topic, "Realtime close handshake timed out");
    }
}
