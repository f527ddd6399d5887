//! Change-notification channel
//!
//! A [`ChangeFeed`] hands out [`Subscription`]s: a stream of [`FeedEvent`]s
//! for the tables named in a [`ChangeFilter`]. The subscription owns the
//! background task that feeds it; dropping it (or calling
//! [`Subscription::unsubscribe`]) releases the channel.

mod memory;
pub mod protocol;
mod socket;

pub use memory::MemoryChangeFeed;
pub use socket::RealtimeChangeFeed;

use async_trait::async_trait;
use shared::ChangeEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::DataResult;

/// Events buffered per subscription before new ones are coalesced
pub const EVENT_BUFFER: usize = 256;

/// What a subscription listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub channel: String,
    pub schema: String,
    pub tables: Vec<String>,
}

impl ChangeFilter {
    pub fn new(
        channel: impl Into<String>,
        schema: impl Into<String>,
        tables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            channel: channel.into(),
            schema: schema.into(),
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.realtime.channel.clone(),
            config.schema.clone(),
            config.realtime.tables.clone(),
        )
    }

    /// Channel topic on the realtime socket
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.schema == self.schema && self.tables.iter().any(|t| *t == event.table)
    }
}

/// Item yielded by a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A row changed on a watched table
    Change(ChangeEvent),
    /// Notifications may have been missed (reconnect, lagging receiver);
    /// consumers must treat this like a change
    Resync,
}

/// Source of change notifications
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription; fails if the channel cannot be joined
    async fn subscribe(&self, filter: &ChangeFilter) -> DataResult<Subscription>;
}

/// Outcome of handing an event to the subscriber
pub(crate) enum Forward {
    Delivered,
    /// Buffer full: an undelivered event is already queued, so the consumer
    /// will refetch after this one anyway
    Coalesced,
    SubscriberGone,
}

pub(crate) fn forward(tx: &mpsc::Sender<FeedEvent>, event: FeedEvent) -> Forward {
    match tx.try_send(event) {
        Ok(()) => Forward::Delivered,
        Err(mpsc::error::TrySendError::Full(_)) => Forward::Coalesced,
        Err(mpsc::error::TrySendError::Closed(_)) => Forward::SubscriberGone,
    }
}

/// Live subscription to a [`ChangeFeed`]
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(
        events: mpsc::Receiver<FeedEvent>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            cancel,
            task: Some(task),
        }
    }

    /// Wait for the next event; `None` once the feed has ended
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Next event if one is already queued
    pub fn try_next(&mut self) -> Option<FeedEvent> {
        self.events.try_recv().ok()
    }

    /// Leave the channel and wait for the feed task to finish
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("Subscription task ended abnormally: {}", e);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
