//! In-memory zone repository
//!
//! Behaves like the remote store as far as the view model can tell:
//! server-assigned ids and timestamps, newest-first reads with joined
//! reviews, foreign-key checks on reviews, and a change event published on
//! the attached [`MemoryChangeFeed`] for every write.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use shared::{
    ChangeEvent, ChangeKind, NewSafetyReview, NewSafetyZone, SafetyReview, SafetyZoneRow,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{REVIEWS_TABLE, ZONES_TABLE, ZoneRepository};
use crate::error::{DataAccessError, DataResult};
use crate::realtime::MemoryChangeFeed;

#[derive(Debug, Default)]
struct Store {
    /// Zone rows without their reviews
    zones: Vec<SafetyZoneRow>,
    reviews: Vec<SafetyReview>,
    last_timestamp: Option<DateTime<Utc>>,
    unavailable: bool,
}

impl Store {
    /// Strictly increasing timestamp so insertion order survives sorting
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn check_available(&self) -> DataResult<()> {
        if self.unavailable {
            return Err(DataAccessError::Store {
                status: 503,
                code: None,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Zone repository backed by process memory
#[derive(Debug, Clone)]
pub struct MemoryZoneRepository {
    store: Arc<Mutex<Store>>,
    feed: Option<MemoryChangeFeed>,
    schema: String,
    fetches: Arc<AtomicUsize>,
}

impl MemoryZoneRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            feed: None,
            schema: "public".to_string(),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a change on `feed` for every write
    pub fn with_feed(mut self, feed: MemoryChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Schema reported in published change events
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Number of `fetch_zones` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn zone_count(&self) -> usize {
        self.store.lock().await.zones.len()
    }

    /// Make every call fail with a 503 until switched back
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.store.lock().await.unavailable = unavailable;
    }

    /// Delete a zone and its reviews; `false` if it did not exist
    pub async fn delete_zone(&self, id: &str) -> DataResult<bool> {
        {
            let mut store = self.store.lock().await;
            store.check_available()?;
            let before = store.zones.len();
            store.zones.retain(|z| z.id != id);
            if store.zones.len() == before {
                return Ok(false);
            }
            store.reviews.retain(|r| r.zone_id != id);
        }

        self.publish(
            ChangeEvent::new(&self.schema, ZONES_TABLE, ChangeKind::Delete)
                .with_old_record(serde_json::json!({ "id": id })),
        );
        tracing::info!(zone_id = %id, "Safety zone deleted");
        Ok(true)
    }

    /// Flip a zone's `verified` flag
    pub async fn set_verified(&self, id: &str, verified: bool) -> DataResult<SafetyZoneRow> {
        let row = {
            let mut store = self.store.lock().await;
            store.check_available()?;
            let ts = store.next_timestamp();
            let zone = store
                .zones
                .iter_mut()
                .find(|z| z.id == id)
                .ok_or_else(|| not_found(id))?;
            zone.verified = verified;
            zone.updated_at = ts;
            zone.clone()
        };

        self.publish(
            ChangeEvent::new(&self.schema, ZONES_TABLE, ChangeKind::Update)
                .with_record(serde_json::to_value(&row)?)
                .with_old_record(serde_json::json!({ "id": id })),
        );
        Ok(row)
    }

    fn publish(&self, event: ChangeEvent) {
        if let Some(feed) = &self.feed {
            feed.publish(event);
        }
    }
}

impl Default for MemoryZoneRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ZoneRepository for MemoryZoneRepository {
    async fn fetch_zones(&self) -> DataResult<Vec<SafetyZoneRow>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let store = self.store.lock().await;
        store.check_available()?;

        let mut rows: Vec<SafetyZoneRow> = store
            .zones
            .iter()
            .map(|zone| {
                let mut row = zone.clone();
                row.reviews = store
                    .reviews
                    .iter()
                    .filter(|r| r.zone_id == zone.id)
                    .cloned()
                    .collect();
                row
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_zone(&self, zone: &NewSafetyZone) -> DataResult<SafetyZoneRow> {
        let row = {
            let mut store = self.store.lock().await;
            store.check_available()?;
            let ts = store.next_timestamp();
            let row = SafetyZoneRow {
                id: Uuid::new_v4().to_string(),
                name: zone.name.clone(),
                description: zone.description.clone(),
                safety_level: zone.safety_level,
                latitude: zone.latitude,
                longitude: zone.longitude,
                radius: zone.radius,
                verified: false,
                created_by: None,
                created_at: ts,
                updated_at: ts,
                reviews: Vec::new(),
            };
            store.zones.push(row.clone());
            row
        };

        self.publish(
            ChangeEvent::new(&self.schema, ZONES_TABLE, ChangeKind::Insert)
                .with_record(serde_json::to_value(&row)?),
        );
        tracing::debug!(zone_id = %row.id, "Zone stored in memory");
        Ok(row)
    }

    async fn insert_review(&self, review: &NewSafetyReview) -> DataResult<SafetyReview> {
        let row = {
            let mut store = self.store.lock().await;
            store.check_available()?;
            if !store.zones.iter().any(|z| z.id == review.zone_id) {
                return Err(DataAccessError::Store {
                    status: 409,
                    code: Some("23503".to_string()),
                    message: format!(
                        "insert or update on table \"{REVIEWS_TABLE}\" violates foreign key \
                         constraint (zone {} does not exist)",
                        review.zone_id
                    ),
                });
            }

            let row = SafetyReview {
                id: Uuid::new_v4().to_string(),
                zone_id: review.zone_id.clone(),
                user_id: review.user_id.clone(),
                rating: review.rating,
                comment: review.comment.clone(),
                is_local_guide: review.is_local_guide,
                images: review.images.clone(),
                created_at: store.next_timestamp(),
                helpful: 0,
            };
            store.reviews.push(row.clone());
            row
        };

        self.publish(
            ChangeEvent::new(&self.schema, REVIEWS_TABLE, ChangeKind::Insert)
                .with_record(serde_json::to_value(&row)?),
        );
        Ok(row)
    }
}

fn not_found(id: &str) -> DataAccessError {
    DataAccessError::Store {
        status: 404,
        code: None,
        message: format!("Zone {id} not found"),
    }
}
