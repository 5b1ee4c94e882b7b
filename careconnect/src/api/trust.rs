use tracing::{error, info};
use warp::{Rejection, Reply};

use super::AppState;
use crate::agents::trust_scoring::calculate_trust_score;
use crate::error::ApiError;
use crate::models::{TrustScoreRequest, TrustScoreResponse};

/// Scores a facility by id without going through the conversation graph.
pub async fn handle_calculate(request: TrustScoreRequest, state: AppState) -> Result<impl Reply, Rejection> {
    let facility = state
        .facilities
        .get_facility(request.facility_id)
        .await
        .map_err(|e| {
            error!("Failed to load facility {}: {}", request.facility_id, e);
            warp::reject::custom(ApiError::Store(e))
        })?
        .ok_or_else(|| {
            warp::reject::custom(ApiError::NotFound(format!("facility {}", request.facility_id)))
        })?;

    let assessment = calculate_trust_score(&facility);
    info!("Trust score for {}: {}/100", facility.display_name(), assessment.score);

    Ok(warp::reply::json(&TrustScoreResponse {
        facility_id: assessment.facility_id,
        facility_name: assessment.facility_name,
        score: assessment.score,
        assessment: assessment.recommendation.to_string(),
        breakdown: assessment.breakdown,
        flags: assessment.flags,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::routes;
    use crate::api::test_support::state_with;
    use crate::error::handle_rejection;
    use crate::models::Facility;
    use crate::testing::{InMemoryFacilityStore, StaticSearch};
    use serde_json::{json, Value};
    use uuid::Uuid;
    use warp::http::StatusCode;
    use warp::Filter;

    #[tokio::test]
    async fn scores_a_stored_facility() {
        let facility = Facility {
            id: Uuid::new_v4(),
            name: Some("Test Clinic".into()),
            facility_type_id: Some("hospital".into()),
            capacity: Some(5),
            ..Default::default()
        };
        let id = facility.id;
        let store = InMemoryFacilityStore::with_facilities(vec![facility]);
        let api = routes(state_with(store, StaticSearch::new(vec![]))).recover(handle_rejection);

        let res = warp::test::request()
            .method("POST")
            .path("/api/trust-score/calculate")
            .json(&json!({ "facility_id": id }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["score"], 22);
        assert_eq!(body["assessment"], "Low Trust - Significant data quality issues");
        assert_eq!(body["breakdown"]["consistency"], 20);
        assert!(body["flags"]
            .as_array()
            .unwrap()
            .contains(&json!("Suspicious facility name")));
    }

    #[tokio::test]
    async fn unknown_facility_is_not_found() {
        let api = routes(state_with(InMemoryFacilityStore::default(), StaticSearch::new(vec![])))
            .recover(handle_rejection);

        let res = warp::test::request()
            .method("POST")
            .path("/api/trust-score/calculate")
            .json(&json!({ "facility_id": Uuid::new_v4() }))
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
