use tracing::{error, info};
use uuid::Uuid;
use warp::{Rejection, Reply};

use super::deserts::regional_analysis;
use super::AppState;
use crate::error::ApiError;
use crate::models::SummaryResponse;

pub async fn handle_get_facility(facility_id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    info!("Fetching facility {}", facility_id);

    let facility = state
        .facilities
        .get_facility(facility_id)
        .await
        .map_err(|e| {
            error!("Failed to fetch facility {}: {}", facility_id, e);
            warp::reject::custom(ApiError::Store(e))
        })?
        .ok_or_else(|| warp::reject::custom(ApiError::NotFound(format!("facility {}", facility_id))))?;

    Ok(warp::reply::json(&facility))
}

pub async fn handle_summary(state: AppState) -> Result<impl Reply, Rejection> {
    let stats = state.facilities.summary_stats().await.map_err(|e| {
        error!("Failed to compute summary stats: {}", e);
        warp::reject::custom(ApiError::Store(e))
    })?;
    let analysis = regional_analysis(&state).await?;

    let (medical_deserts_count, average_facilities_per_region) = analysis
        .map(|a| (a.medical_deserts.len(), a.average_per_region))
        .unwrap_or((0, 0.0));

    Ok(warp::reply::json(&SummaryResponse {
        stats,
        medical_deserts_count,
        average_facilities_per_region,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::routes;
    use crate::api::test_support::state_with;
    use crate::error::handle_rejection;
    use crate::models::Facility;
    use crate::testing::{region, InMemoryFacilityStore, StaticSearch};
    use serde_json::{json, Value};
    use uuid::Uuid;
    use warp::http::StatusCode;
    use warp::Filter;

    fn ridge() -> Facility {
        Facility {
            id: Uuid::new_v4(),
            name: Some("Ridge Hospital".into()),
            facility_type_id: Some("hospital".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn facility_by_id_or_404() {
        let facility = ridge();
        let id = facility.id;
        let store = InMemoryFacilityStore::with_facilities(vec![facility]);
        let api = routes(state_with(store, StaticSearch::new(vec![]))).recover(handle_rejection);

        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/facilities/{}", id))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["name"], "Ridge Hospital");

        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/facilities/{}", Uuid::new_v4()))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn summary_includes_desert_count() {
        let store = InMemoryFacilityStore::with_regions(vec![region("A", 2), region("B", 2), region("C", 20)])
            .with_ngo_count(4);
        let api = routes(state_with(store, StaticSearch::new(vec![]))).recover(handle_rejection);

        let res = warp::test::request()
            .method("GET")
            .path("/api/stats/summary")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["total_ngos"], 4);
        assert_eq!(body["total_regions"], 3);
        assert_eq!(body["medical_deserts_count"], 2);
        assert_eq!(body["average_facilities_per_region"], json!(8.0));
    }
}
