//! In-process change feed
//!
//! Broadcast-channel implementation of [`ChangeFeed`]. Paired with
//! `MemoryZoneRepository`, which publishes an event for every write, it gives
//! the whole data module a network-free backend.

use async_trait::async_trait;
use shared::ChangeEvent;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::{ChangeFeed, ChangeFilter, EVENT_BUFFER, FeedEvent, Forward, Subscription, forward};
use crate::error::DataResult;

/// In-memory change feed
#[derive(Debug, Clone)]
pub struct MemoryChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl MemoryChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a change to every live subscription; returns how many saw it
    pub fn publish(&self, event: ChangeEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::debug!("No subscribers for change event");
                0
            }
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MemoryChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn subscribe(&self, filter: &ChangeFilter) -> DataResult<Subscription> {
        let mut rx = self.tx.subscribe();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let filter = filter.clone();
        let token = cancel.clone();
        tracing::debug!(channel = %filter.channel, "Memory subscription opened");

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) if filter.matches(&event) => FeedEvent::Change(event),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Change feed lagged, requesting resync");
                            FeedEvent::Resync
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                if let Forward::SubscriberGone = forward(&tx, event) {
                    break;
                }
            }
            tracing::debug!(channel = %filter.channel, "Memory subscription closed");
        });

        Ok(Subscription::new(events, cancel, task))
    }
}
