//! Live Update Listener
//!
//! Background task turning change notifications into refetches. Events that
//! pile up while a refetch is running are drained and answered by a single
//! follow-up refetch, so a burst of changes costs at most two fetches.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::realtime::{FeedEvent, Subscription};

/// Handle to a running listener
///
/// Dropping the handle stops the task; [`LiveUpdateListener::stop`] also
/// waits for the subscription to be released.
#[derive(Debug)]
pub struct LiveUpdateListener {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveUpdateListener {
    /// Start listening; `on_change` runs once per (coalesced) notification
    pub fn spawn<F, Fut>(subscription: Subscription, on_change: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(subscription, on_change, cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the listener and wait for the subscription to be released
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!("Live update listener ended abnormally: {}", e);
        }
    }
}

impl Drop for LiveUpdateListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<F, Fut>(mut subscription: Subscription, on_change: F, cancel: CancellationToken)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::debug!("Live update listener started");

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = subscription.next() => event,
        };

        let Some(event) = event else {
            tracing::warn!("Change feed ended, live updates stopped");
            break;
        };

        let mut coalesced = 0usize;
        while subscription.try_next().is_some() {
            coalesced += 1;
        }
        match &event {
            FeedEvent::Change(change) => tracing::debug!(
                table = %change.table,
                kind = %change.kind,
                coalesced,
                "Change received, refetching"
            ),
            FeedEvent::Resync => tracing::info!(coalesced, "Change feed resynced, refetching"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = on_change() => {}
        }
    }

    subscription.unsubscribe().await;
    tracing::debug!("Live update listener stopped");
}
