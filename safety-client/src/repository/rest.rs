//! REST-backed zone repository

use async_trait::async_trait;
use shared::{NewSafetyReview, NewSafetyZone, SafetyReview, SafetyZoneRow};

use super::{REVIEWS_TABLE, ZONE_ORDER, ZONE_SELECT, ZONES_TABLE, ZoneRepository};
use crate::config::ClientConfig;
use crate::error::DataResult;
use crate::http::RestClient;

/// Zone repository over the store's REST endpoint
///
/// No retries: a failed call is returned to the caller as-is.
#[derive(Debug, Clone)]
pub struct RestZoneRepository {
    http: RestClient,
}

impl RestZoneRepository {
    pub fn new(http: RestClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &ClientConfig) -> DataResult<Self> {
        Ok(Self::new(RestClient::new(config)?))
    }
}

#[async_trait]
impl ZoneRepository for RestZoneRepository {
    async fn fetch_zones(&self) -> DataResult<Vec<SafetyZoneRow>> {
        let rows: Vec<SafetyZoneRow> = self
            .http
            .select(ZONES_TABLE, &[("select", ZONE_SELECT), ("order", ZONE_ORDER)])
            .await?;
        tracing::debug!(count = rows.len(), "Fetched safety zones");
        Ok(rows)
    }

    async fn insert_zone(&self, zone: &NewSafetyZone) -> DataResult<SafetyZoneRow> {
        let row: SafetyZoneRow = self.http.insert_one(ZONES_TABLE, zone).await?;
        tracing::info!(zone_id = %row.id, name = %row.name, "Safety zone created");
        Ok(row)
    }

    async fn insert_review(&self, review: &NewSafetyReview) -> DataResult<SafetyReview> {
        let row: SafetyReview = self.http.insert_one(REVIEWS_TABLE, review).await?;
        tracing::info!(review_id = %row.id, zone_id = %row.zone_id, "Safety review created");
        Ok(row)
    }
}
