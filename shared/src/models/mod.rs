//! Data models
//!
//! Field names follow the `safety_zones` / `safety_reviews` columns of the
//! remote store; renaming a column there breaks deserialization here.

pub mod geo;
pub mod safety_review;
pub mod safety_zone;

// Re-exports
pub use geo::*;
pub use safety_review::*;
pub use safety_zone::*;
