//! Safety Client - safety-zone data module
//!
//! Reads safety zones (with their reviews) from the remote store, keeps an
//! in-memory view of them fresh through the store's change notifications,
//! and exposes the add-zone / add-review writes. Presentation code only
//! talks to [`ZoneViewModel`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod http;
pub mod listener;
pub mod realtime;
pub mod repository;
pub mod validation;
pub mod view_model;

pub use config::{ClientConfig, RealtimeConfig};
pub use error::{DataAccessError, DataResult};
pub use http::RestClient;
pub use listener::LiveUpdateListener;
pub use realtime::{
    ChangeFeed, ChangeFilter, FeedEvent, MemoryChangeFeed, RealtimeChangeFeed, Subscription,
};
pub use repository::{MemoryZoneRepository, RestZoneRepository, ZoneRepository};
pub use view_model::{FETCH_FAILED_MESSAGE, ViewModelOptions, ZoneState, ZoneViewModel};

// Re-export shared types for convenience
pub use shared::{
    ChangeEvent, ChangeKind, DEFAULT_LOCATION, GeoPoint, NewSafetyReview, NewSafetyZone,
    SafetyLevel, SafetyReview, SafetyZone, SafetyZoneRow,
};
