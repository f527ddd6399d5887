//! Safety Review Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `safety_reviews` record
///
/// A review belongs to exactly one zone. `rating` is expected to be 1-5; rows
/// written by other clients are accepted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReview {
    pub id: String,
    pub zone_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_local_guide: bool,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    /// "Helpful" votes
    #[serde(default)]
    pub helpful: i64,
}

/// Create review payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSafetyReview {
    pub zone_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub rating: i32,
    pub comment: Option<String>,
    pub is_local_guide: bool,
    pub images: Option<Vec<String>>,
}

impl NewSafetyReview {
    pub fn new(zone_id: impl Into<String>, rating: i32) -> Self {
        Self {
            zone_id: zone_id.into(),
            user_id: None,
            rating,
            comment: None,
            is_local_guide: false,
            images: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_author(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn local_guide(mut self) -> Self {
        self.is_local_guide = true;
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = Some(images);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_only_sent_when_present() {
        let anonymous = serde_json::to_value(NewSafetyReview::new("z1", 5)).unwrap();
        assert!(anonymous.get("user_id").is_none());
        assert_eq!(anonymous["is_local_guide"], false);

        let authored =
            serde_json::to_value(NewSafetyReview::new("z1", 5).with_author("u-42")).unwrap();
        assert_eq!(authored["user_id"], "u-42");
    }

    #[test]
    fn test_review_defaults() {
        let review: SafetyReview = serde_json::from_str(
            r#"{"id":"r9","zone_id":"z1","rating":2,"created_at":"2024-05-05T08:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(review.helpful, 0);
        assert!(!review.is_local_guide);
        assert!(review.comment.is_none());
    }
}
