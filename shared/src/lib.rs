//! Shared types for the safety-zone data module
//!
//! Wire and domain types used by the client crate and anything that renders
//! its state: zone/review models, geographic helpers and change
//! notifications emitted by the remote store.

pub mod change;
pub mod models;

// Re-exports
pub use change::{ChangeEvent, ChangeKind};
pub use models::{
    DEFAULT_LOCATION, GeoPoint, NewSafetyReview, NewSafetyZone, SafetyLevel, SafetyReview,
    SafetyZone, SafetyZoneRow, haversine_distance_m,
};
