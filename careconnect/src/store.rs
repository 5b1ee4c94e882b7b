// Facility/NGO store backed by Postgres

use async_trait::async_trait;
use sqlx::types::Json;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::StoreError;
use crate::models::{Facility, RegionStats, SummaryStats};

#[async_trait]
pub trait FacilityStore: Send + Sync {
    /// Case-insensitive substring match on the facility name; the first row
    /// the database returns wins.
    async fn find_facility_by_name(&self, name_substring: &str) -> Result<Option<Facility>, StoreError>;

    async fn get_facility(&self, id: Uuid) -> Result<Option<Facility>, StoreError>;

    /// Facility counts per region with hospital/clinic sub-counts and the
    /// number of distinct specialties offered in the region.
    async fn aggregate_by_region(&self) -> Result<Vec<RegionStats>, StoreError>;

    async fn summary_stats(&self) -> Result<SummaryStats, StoreError>;
}

#[derive(Clone)]
pub struct PgFacilityStore {
    pool: DbPool,
}

impl PgFacilityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Escapes LIKE wildcards so user text only ever matches literally.
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl FacilityStore for PgFacilityStore {
    async fn find_facility_by_name(&self, name_substring: &str) -> Result<Option<Facility>, StoreError> {
        debug!("Looking up facility by name fragment '{}'", name_substring);
        let row = sqlx::query_scalar::<_, Json<Facility>>(
            "SELECT row_to_json(f.*) FROM facilities f WHERE f.name ILIKE $1 LIMIT 1",
        )
        .bind(like_pattern(name_substring))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|Json(facility)| facility))
    }

    async fn get_facility(&self, id: Uuid) -> Result<Option<Facility>, StoreError> {
        let row = sqlx::query_scalar::<_, Json<Facility>>(
            "SELECT row_to_json(f.*) FROM facilities f WHERE f.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|Json(facility)| facility))
    }

    async fn aggregate_by_region(&self) -> Result<Vec<RegionStats>, StoreError> {
        let mut regions = sqlx::query_as::<_, RegionStats>(
            "SELECT
                COALESCE(address_state_or_region, 'Unknown') AS region,
                COUNT(*) AS total_facilities,
                COUNT(DISTINCT facility_type_id) AS facility_types,
                COUNT(CASE WHEN facility_type_id = 'hospital' THEN 1 END) AS hospitals,
                COUNT(CASE WHEN facility_type_id = 'clinic' THEN 1 END) AS clinics
             FROM facilities
             GROUP BY COALESCE(address_state_or_region, 'Unknown')
             ORDER BY total_facilities ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let specialty_counts: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT region, COUNT(DISTINCT specialty)
             FROM (
                SELECT
                    COALESCE(address_state_or_region, 'Unknown') AS region,
                    jsonb_array_elements_text(specialties) AS specialty
                FROM facilities
                WHERE specialties IS NOT NULL AND jsonb_typeof(specialties) = 'array'
             ) AS specialty_data
             GROUP BY region",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        for region in &mut regions {
            region.specialty_count = specialty_counts.get(&region.region).copied().unwrap_or(0);
        }

        Ok(regions)
    }

    async fn summary_stats(&self) -> Result<SummaryStats, StoreError> {
        let total_facilities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM facilities")
            .fetch_one(&self.pool)
            .await?;
        let total_ngos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ngos")
            .fetch_one(&self.pool)
            .await?;
        let total_regions: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT address_state_or_region) FROM facilities")
                .fetch_one(&self.pool)
                .await?;

        let facilities_by_type: BTreeMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT COALESCE(facility_type_id, 'unknown'), COUNT(*)
             FROM facilities
             GROUP BY COALESCE(facility_type_id, 'unknown')",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        Ok(SummaryStats {
            total_facilities,
            total_ngos,
            total_regions,
            facilities_by_type,
        })
    }
}
