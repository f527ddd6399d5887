//! Safety Zone Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::geo::{GeoPoint, haversine_distance_m};
use super::safety_review::SafetyReview;

/// Safety classification of a zone
///
/// Reads are lenient: the older `danger` value and anything unrecognised
/// count as [`SafetyLevel::Unsafe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Moderate,
    Unsafe,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Moderate => "moderate",
            SafetyLevel::Unsafe => "unsafe",
        }
    }

    /// Legend label shown next to the zone marker
    pub fn label(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "Safe",
            SafetyLevel::Moderate => "Moderate",
            SafetyLevel::Unsafe => "Use Caution",
        }
    }

    /// Parse a stored value, falling back to `Unsafe`
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "safe" => SafetyLevel::Safe,
            "moderate" => SafetyLevel::Moderate,
            _ => SafetyLevel::Unsafe,
        }
    }
}

impl<'de> Deserialize<'de> for SafetyLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SafetyLevel::parse_lenient(&value))
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw `safety_zones` record joined with its reviews
///
/// This is what the store returns for
/// `select=*,reviews:safety_reviews(*)`. The review list is the complete,
/// unordered set for the zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyZoneRow {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    pub safety_level: SafetyLevel,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius of the area of effect, in meters
    pub radius: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub verified: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reviews: Vec<SafetyReview>,
}

/// Safety zone as held by the view model
///
/// `average_rating` is derived from `reviews` when the row is formatted and
/// is never written back to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyZone {
    pub id: String,
    pub name: String,
    pub description: String,
    pub safety_level: SafetyLevel,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub reviews: Vec<SafetyReview>,
    pub average_rating: f64,
    pub verified: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SafetyZone {
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Distance in meters from the zone center to `point`
    pub fn distance_to(&self, point: GeoPoint) -> f64 {
        haversine_distance_m(self.center(), point)
    }

    /// Whether `point` lies inside the zone's radius
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.distance_to(point) <= self.radius
    }
}

/// Create zone payload (the columns written by an insert)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSafetyZone {
    pub name: String,
    pub safety_level: SafetyLevel,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

impl NewSafetyZone {
    pub fn new(
        name: impl Into<String>,
        safety_level: SafetyLevel,
        center: GeoPoint,
        radius: f64,
    ) -> Self {
        Self {
            name: name.into(),
            safety_level,
            description: String::new(),
            latitude: center.latitude,
            longitude: center.longitude,
            radius,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_level_wire_format() {
        assert_eq!(
            serde_json::to_string(&SafetyLevel::Unsafe).unwrap(),
            "\"unsafe\""
        );
        let level: SafetyLevel = serde_json::from_str("\"moderate\"").unwrap();
        assert_eq!(level, SafetyLevel::Moderate);
        assert_eq!(SafetyLevel::Unsafe.label(), "Use Caution");
    }

    #[test]
    fn test_legacy_and_unknown_levels_read_as_unsafe() {
        for raw in ["\"danger\"", "\"unsafe\"", "\"hazardous\"", "\"\""] {
            let level: SafetyLevel = serde_json::from_str(raw).unwrap();
            assert_eq!(level, SafetyLevel::Unsafe, "{raw}");
        }
        assert!(serde_json::from_str::<SafetyLevel>("3").is_err());

        // Written back in the current vocabulary
        let level: SafetyLevel = serde_json::from_str("\"danger\"").unwrap();
        assert_eq!(serde_json::to_string(&level).unwrap(), "\"unsafe\"");
    }

    #[test]
    fn test_row_with_joined_reviews() {
        let json = r#"{
            "id": "5b1c",
            "name": "Old Town",
            "description": "Busy at night",
            "safety_level": "moderate",
            "latitude": 40.7128,
            "longitude": -74.006,
            "radius": 500,
            "verified": true,
            "created_by": null,
            "created_at": "2024-03-01T10:00:00.123456+00:00",
            "updated_at": "2024-03-02T10:00:00+00:00",
            "reviews": [{
                "id": "r1",
                "zone_id": "5b1c",
                "user_id": "u1",
                "rating": 4,
                "comment": "Fine during the day",
                "is_local_guide": true,
                "images": null,
                "created_at": "2024-03-01T12:00:00Z",
                "helpful": 3
            }]
        }"#;

        let row: SafetyZoneRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.safety_level, SafetyLevel::Moderate);
        assert_eq!(row.radius, 500.0);
        assert!(row.verified);
        assert!(row.created_by.is_none());
        assert_eq!(row.reviews.len(), 1);
        assert_eq!(row.reviews[0].rating, 4);
        assert!(row.reviews[0].images.is_none());
    }

    #[test]
    fn test_row_tolerates_null_columns() {
        let json = r#"{
            "id": "z1",
            "name": "Harbor",
            "description": null,
            "safety_level": "safe",
            "latitude": 0.0,
            "longitude": 0.0,
            "radius": 100.0,
            "verified": null,
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z",
            "reviews": null
        }"#;

        let row: SafetyZoneRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.description, "");
        assert!(!row.verified);
        assert!(row.reviews.is_empty());
    }

    #[test]
    fn test_new_zone_serializes_insert_columns_only() {
        let zone = NewSafetyZone::new(
            "Central Station",
            SafetyLevel::Unsafe,
            GeoPoint::new(52.52, 13.405),
            250.0,
        )
        .with_description("Pickpockets");

        let value = serde_json::to_value(&zone).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 6);
        assert_eq!(object["safety_level"], "unsafe");
        assert_eq!(object["description"], "Pickpockets");
    }
}
