//! Input validation helpers
//!
//! Checks run at the write boundary, before anything is sent to the store.
//! Reads are never re-validated: rows written by other clients are
//! aggregated as they come.

use shared::{NewSafetyReview, NewSafetyZone};

use crate::error::{DataAccessError, DataResult};

// ── Limits ──────────────────────────────────────────────────────────

/// Zone names
pub const MAX_NAME_LEN: usize = 200;

/// Zone descriptions and review comments
pub const MAX_TEXT_LEN: usize = 2000;

/// Image URLs / storage paths
pub const MAX_URL_LEN: usize = 2048;

/// Images attached to one review
pub const MAX_IMAGES: usize = 10;

/// Accepted review ratings
pub const RATING_RANGE: std::ops::RangeInclusive<i32> = 1..=5;

// ── Field helpers ───────────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> DataResult<()> {
    if value.trim().is_empty() {
        return Err(DataAccessError::validation(format!(
            "{field} must not be empty"
        )));
    }
    validate_text_len(value, field, max_len)
}

/// Validate that a string is within the length limit.
pub fn validate_text_len(value: &str, field: &str, max_len: usize) -> DataResult<()> {
    let len = value.chars().count();
    if len > max_len {
        return Err(DataAccessError::validation(format!(
            "{field} is too long ({len} chars, max {max_len})"
        )));
    }
    Ok(())
}

/// Validate that a coordinate component is finite and within `[-limit, limit]`.
fn validate_coordinate(value: f64, field: &str, limit: f64) -> DataResult<()> {
    if !value.is_finite() || value.abs() > limit {
        return Err(DataAccessError::validation(format!(
            "{field} must be within [-{limit}, {limit}], got {value}"
        )));
    }
    Ok(())
}

// ── Payload validation ──────────────────────────────────────────────

/// Validate a zone before insert
pub fn validate_new_zone(zone: &NewSafetyZone) -> DataResult<()> {
    validate_required_text(&zone.name, "name", MAX_NAME_LEN)?;
    validate_text_len(&zone.description, "description", MAX_TEXT_LEN)?;
    validate_coordinate(zone.latitude, "latitude", 90.0)?;
    validate_coordinate(zone.longitude, "longitude", 180.0)?;

    if !zone.radius.is_finite() || zone.radius <= 0.0 {
        return Err(DataAccessError::validation(format!(
            "radius must be a positive number of meters, got {}",
            zone.radius
        )));
    }
    Ok(())
}

/// Validate a review before insert
pub fn validate_new_review(review: &NewSafetyReview) -> DataResult<()> {
    if review.zone_id.trim().is_empty() {
        return Err(DataAccessError::validation("zone_id must not be empty"));
    }

    if !RATING_RANGE.contains(&review.rating) {
        return Err(DataAccessError::validation(format!(
            "rating must be between {} and {}, got {}",
            RATING_RANGE.start(),
            RATING_RANGE.end(),
            review.rating
        )));
    }

    if let Some(comment) = &review.comment {
        validate_text_len(comment, "comment", MAX_TEXT_LEN)?;
    }

    if let Some(images) = &review.images {
        if images.len() > MAX_IMAGES {
            return Err(DataAccessError::validation(format!(
                "too many images ({}, max {MAX_IMAGES})",
                images.len()
            )));
        }
        for image in images {
            validate_required_text(image, "image", MAX_URL_LEN)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GeoPoint, SafetyLevel};

    fn zone() -> NewSafetyZone {
        NewSafetyZone::new("Market", SafetyLevel::Safe, GeoPoint::new(10.0, 20.0), 300.0)
    }

    #[test]
    fn test_valid_zone() {
        assert!(validate_new_zone(&zone()).is_ok());
    }

    #[test]
    fn test_zone_rejections() {
        let mut blank = zone();
        blank.name = "   ".into();
        assert!(validate_new_zone(&blank).is_err());

        let mut north = zone();
        north.latitude = 90.5;
        assert!(validate_new_zone(&north).is_err());

        let mut nan = zone();
        nan.longitude = f64::NAN;
        assert!(validate_new_zone(&nan).is_err());

        let mut flat = zone();
        flat.radius = 0.0;
        assert!(validate_new_zone(&flat).is_err());

        let mut long = zone();
        long.description = "x".repeat(MAX_TEXT_LEN + 1);
        assert!(validate_new_zone(&long).is_err());
    }

    #[test]
    fn test_rating_bounds() {
        for rating in 1..=5 {
            assert!(validate_new_review(&NewSafetyReview::new("z1", rating)).is_ok());
        }
        for rating in [0, 6, -1, 100] {
            let err = validate_new_review(&NewSafetyReview::new("z1", rating)).unwrap_err();
            assert!(matches!(err, DataAccessError::Validation(_)));
        }
    }

    #[test]
    fn test_review_rejections() {
        assert!(validate_new_review(&NewSafetyReview::new("", 3)).is_err());

        let too_many = NewSafetyReview::new("z1", 3)
            .with_images((0..=MAX_IMAGES).map(|i| format!("img/{i}.jpg")).collect());
        assert!(validate_new_review(&too_many).is_err());

        let empty_image = NewSafetyReview::new("z1", 3).with_images(vec![String::new()]);
        assert!(validate_new_review(&empty_image).is_err());
    }
}
