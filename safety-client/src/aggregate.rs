//! Aggregation
//!
//! Pure functions turning raw store rows into [`SafetyZone`]s.

use shared::{SafetyReview, SafetyZone, SafetyZoneRow};

/// Arithmetic mean of the review ratings, `0.0` when there are none.
///
/// Ratings are summed as integers so the result does not depend on review
/// order.
pub fn average_rating(reviews: &[SafetyReview]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    sum as f64 / reviews.len() as f64
}

/// Format a raw row into a zone, deriving `average_rating`
pub fn format_zone(row: SafetyZoneRow) -> SafetyZone {
    let average_rating = average_rating(&row.reviews);
    SafetyZone {
        id: row.id,
        name: row.name,
        description: row.description,
        safety_level: row.safety_level,
        latitude: row.latitude,
        longitude: row.longitude,
        radius: row.radius,
        reviews: row.reviews,
        average_rating,
        verified: row.verified,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

/// Format rows in the order they were returned
pub fn format_zones(rows: Vec<SafetyZoneRow>) -> Vec<SafetyZone> {
    rows.into_iter().map(format_zone).collect()
}
