//! Zone View Model
//!
//! Owns the in-memory zone state and wires the repository, the aggregation
//! step and the live-update listener together. Presentation code reads
//! [`ZoneState`] snapshots (or awaits changes through
//! [`ZoneViewModel::subscribe_state`]) and calls the imperative operations.
//!
//! Every fetch replaces the whole zone list. Fetches are numbered: only the
//! most recently started one may commit, so overlapping refreshes can never
//! leave older data (or a stuck loading flag) behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use shared::{
    GeoPoint, NewSafetyReview, NewSafetyZone, SafetyLevel, SafetyReview, SafetyZone,
};
use tokio::sync::{Mutex, watch};

use crate::aggregate::{format_zone, format_zones};
use crate::config::{ClientConfig, DEFAULT_CHANNEL};
use crate::error::DataResult;
use crate::listener::LiveUpdateListener;
use crate::realtime::{ChangeFeed, ChangeFilter, RealtimeChangeFeed};
use crate::repository::{RestZoneRepository, ZONES_TABLE, ZoneRepository};
use crate::validation::{validate_new_review, validate_new_zone};

/// Message surfaced in [`ZoneState::error`] when a fetch fails
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch safety zones";

/// Snapshot of the view model state
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneState {
    /// Newest zone first
    pub zones: Vec<SafetyZone>,
    /// True during the initial fetch and explicit refreshes
    pub is_loading: bool,
    /// Set when the last committed fetch failed
    pub error: Option<String>,
}

impl Default for ZoneState {
    fn default() -> Self {
        Self {
            zones: Vec::new(),
            is_loading: true,
            error: None,
        }
    }
}

impl ZoneState {
    pub fn zone(&self, id: &str) -> Option<&SafetyZone> {
        self.zones.iter().find(|z| z.id == id)
    }

    /// Zones whose area covers `point`
    pub fn zones_containing(&self, point: GeoPoint) -> Vec<&SafetyZone> {
        self.zones.iter().filter(|z| z.contains(point)).collect()
    }

    /// Zones whose center is within `max_distance_m` of `point`, closest
    /// first, paired with that distance
    pub fn nearby(&self, point: GeoPoint, max_distance_m: f64) -> Vec<(&SafetyZone, f64)> {
        let mut found: Vec<(&SafetyZone, f64)> = self
            .zones
            .iter()
            .map(|z| (z, z.distance_to(point)))
            .filter(|(_, d)| *d <= max_distance_m)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1));
        found
    }

    pub fn with_level(&self, level: SafetyLevel) -> Vec<&SafetyZone> {
        self.zones
            .iter()
            .filter(|z| z.safety_level == level)
            .collect()
    }
}

/// View model behavior switches
#[derive(Debug, Clone)]
pub struct ViewModelOptions {
    /// Channel and tables whose changes trigger a refetch
    pub filter: ChangeFilter,
    /// Refresh right after a successful write instead of waiting for the
    /// change notification
    pub refresh_after_write: bool,
}

impl Default for ViewModelOptions {
    fn default() -> Self {
        Self {
            filter: ChangeFilter::new(DEFAULT_CHANNEL, "public", [ZONES_TABLE]),
            refresh_after_write: false,
        }
    }
}

impl ViewModelOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            filter: ChangeFilter::from_config(config),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: ChangeFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_refresh_after_write(mut self, enabled: bool) -> Self {
        self.refresh_after_write = enabled;
        self
    }
}

/// State shared with the listener task
struct Inner {
    repository: Arc<dyn ZoneRepository>,
    state: watch::Sender<ZoneState>,
    generation: AtomicU64,
}

impl Inner {
    /// Fetch, format and commit, unless a newer fetch started meanwhile
    async fn load(&self, show_loading: bool) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if show_loading {
            self.state.send_if_modified(|state| {
                let changed = !state.is_loading;
                state.is_loading = true;
                changed
            });
        }

        let result = self.repository.fetch_zones().await;
        if let Err(e) = &result {
            tracing::error!(generation, "Error fetching safety zones: {}", e);
        }

        let committed = self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match result {
                Ok(rows) => {
                    state.zones = format_zones(rows);
                    state.error = None;
                }
                Err(_) => state.error = Some(FETCH_FAILED_MESSAGE.to_string()),
            }
            state.is_loading = false;
            true
        });

        if committed {
            tracing::debug!(generation, "Zone state updated");
        } else {
            tracing::debug!(generation, "Discarding superseded fetch");
        }
    }

    /// Invalidate every fetch in flight
    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Safety-zone view model
pub struct ZoneViewModel {
    inner: Arc<Inner>,
    feed: Arc<dyn ChangeFeed>,
    options: ViewModelOptions,
    listener: Mutex<Option<LiveUpdateListener>>,
}

impl ZoneViewModel {
    pub fn new(
        repository: impl ZoneRepository + 'static,
        feed: impl ChangeFeed + 'static,
        options: ViewModelOptions,
    ) -> Self {
        let (state, _) = watch::channel(ZoneState::default());
        Self {
            inner: Arc::new(Inner {
                repository: Arc::new(repository),
                state,
                generation: AtomicU64::new(0),
            }),
            feed: Arc::new(feed),
            options,
            listener: Mutex::new(None),
        }
    }

    /// View model over the remote store's REST and realtime endpoints
    pub fn connect(config: &ClientConfig) -> DataResult<Self> {
        config.validate()?;
        Ok(Self::new(
            RestZoneRepository::from_config(config)?,
            RealtimeChangeFeed::new(config)?,
            ViewModelOptions::from_config(config),
        ))
    }

    /// Subscribe to live updates, then run the initial fetch
    ///
    /// Returns once the initial fetch has settled; a fetch failure ends up in
    /// [`ZoneState::error`], a subscription failure is returned.
    pub async fn activate(&self) -> DataResult<()> {
        {
            let mut listener = self.listener.lock().await;
            match listener.as_ref() {
                Some(current) if current.is_running() => return Ok(()),
                Some(_) => tracing::info!("Live updates had stopped, resubscribing"),
                None => {}
            }

            let subscription = self.feed.subscribe(&self.options.filter).await?;
            let inner = Arc::clone(&self.inner);
            *listener = Some(LiveUpdateListener::spawn(subscription, move || {
                let inner = Arc::clone(&inner);
                async move { inner.load(false).await }
            }));
        }

        tracing::info!(channel = %self.options.filter.channel, "Zone view model activated");
        self.inner.load(true).await;
        Ok(())
    }

    /// Stop live updates and drop any fetch still in flight
    pub async fn deactivate(&self) {
        let listener = self.listener.lock().await.take();
        self.inner.invalidate();
        if let Some(listener) = listener {
            listener.stop().await;
            tracing::info!("Zone view model deactivated");
        }
    }

    /// `true` while live updates are being received
    pub async fn is_active(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(LiveUpdateListener::is_running)
    }

    /// Current state snapshot
    pub fn state(&self) -> ZoneState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every committed state change
    pub fn subscribe_state(&self) -> watch::Receiver<ZoneState> {
        self.inner.state.subscribe()
    }

    pub fn safety_zones(&self) -> Vec<SafetyZone> {
        self.inner.state.borrow().zones.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    /// Refetch everything, showing the loading flag
    pub async fn refresh_zones(&self) {
        self.inner.load(true).await;
    }

    /// Create a zone; local state catches up through the change feed
    pub async fn add_safety_zone(&self, zone: NewSafetyZone) -> DataResult<SafetyZone> {
        validate_new_zone(&zone)?;
        let row = self
            .inner
            .repository
            .insert_zone(&zone)
            .await
            .inspect_err(|e| tracing::error!("Error adding safety zone: {}", e))?;
        let created = format_zone(row);

        if self.options.refresh_after_write {
            self.refresh_zones().await;
        }
        Ok(created)
    }

    /// Add a review under an existing zone
    pub async fn add_review(&self, review: NewSafetyReview) -> DataResult<SafetyReview> {
        validate_new_review(&review)?;
        let created = self
            .inner
            .repository
            .insert_review(&review)
            .await
            .inspect_err(|e| {
                tracing::error!(zone_id = %review.zone_id, "Error adding review: {}", e)
            })?;

        if self.options.refresh_after_write {
            self.refresh_zones().await;
        }
        Ok(created)
    }
}

impl Drop for ZoneViewModel {
    fn drop(&mut self) {
        self.inner.invalidate();
        // Dropping the listener cancels it
        drop(self.listener.get_mut().take());
    }
}

impl std::fmt::Debug for ZoneViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneViewModel")
            .field("options", &self.options)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}
