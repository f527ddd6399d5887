//! Zone Repository
//!
//! The only code that talks to the remote store's tables. The view model
//! depends on the [`ZoneRepository`] trait, so the REST implementation and
//! the in-memory one are interchangeable.

mod memory;
mod rest;

pub use memory::MemoryZoneRepository;
pub use rest::RestZoneRepository;

use async_trait::async_trait;
use shared::{NewSafetyReview, NewSafetyZone, SafetyReview, SafetyZoneRow};

use crate::error::DataResult;

/// Zone table
pub const ZONES_TABLE: &str = "safety_zones";

/// Review table
pub const REVIEWS_TABLE: &str = "safety_reviews";

/// Zone columns joined with their reviews
pub const ZONE_SELECT: &str = "*,reviews:safety_reviews(*)";

/// Newest zones first
pub const ZONE_ORDER: &str = "created_at.desc";

/// Remote zone storage
#[async_trait]
pub trait ZoneRepository: Send + Sync {
    /// All zones joined with their reviews, newest first
    async fn fetch_zones(&self) -> DataResult<Vec<SafetyZoneRow>>;

    /// Insert a zone and return the stored row (server-assigned id and timestamps)
    async fn insert_zone(&self, zone: &NewSafetyZone) -> DataResult<SafetyZoneRow>;

    /// Insert a review under an existing zone
    async fn insert_review(&self, review: &NewSafetyReview) -> DataResult<SafetyReview>;
}
