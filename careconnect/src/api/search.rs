use tracing::{error, info};
use warp::{Rejection, Reply};

use super::AppState;
use crate::error::ApiError;
use crate::models::{
    EntityType, FacilityHit, FacilitySearchRequest, FacilitySearchResponse, NgoHit, NgoSearchRequest,
    NgoSearchResponse, SearchFilters,
};

const MAX_TOP_K: usize = 50;

fn validate(query: &str, top_k: usize) -> Result<(), Rejection> {
    if query.trim().is_empty() {
        return Err(warp::reject::custom(ApiError::BadRequest("query must not be empty".to_string())));
    }
    if top_k == 0 || top_k > MAX_TOP_K {
        return Err(warp::reject::custom(ApiError::BadRequest(format!(
            "top_k must be between 1 and {}",
            MAX_TOP_K
        ))));
    }
    Ok(())
}

pub async fn handle_search_facilities(
    request: FacilitySearchRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    validate(&request.query, request.top_k)?;
    info!("Facility search: {}", request.query);

    let filters = SearchFilters {
        city: request.city,
        region: request.region,
        specialty: request.specialty,
    };
    let results = state
        .search
        .semantic_search(&request.query, request.top_k, EntityType::Facility, &filters, request.min_similarity)
        .await
        .map_err(|e| {
            error!("Facility search failed: {}", e);
            warp::reject::custom(ApiError::Store(e))
        })?;

    let facilities: Vec<FacilityHit> = results
        .iter()
        .filter_map(|hit| {
            let facility = hit.facility()?;
            Some(FacilityHit {
                id: hit.id,
                phone: facility.phone_numbers().to_vec(),
                specialties: facility.specialties().to_vec(),
                name: facility.name,
                facility_type: facility.facility_type_id,
                city: facility.address_city,
                region: facility.address_state_or_region,
                similarity_score: hit.similarity_score,
            })
        })
        .collect();

    Ok(warp::reply::json(&FacilitySearchResponse {
        count: facilities.len(),
        facilities,
    }))
}

pub async fn handle_search_ngos(request: NgoSearchRequest, state: AppState) -> Result<impl Reply, Rejection> {
    validate(&request.query, request.top_k)?;
    info!("NGO search: {}", request.query);

    let results = state
        .search
        .semantic_search(&request.query, request.top_k, EntityType::Ngo, &SearchFilters::default(), 0.0)
        .await
        .map_err(|e| {
            error!("NGO search failed: {}", e);
            warp::reject::custom(ApiError::Store(e))
        })?;

    let ngos: Vec<NgoHit> = results
        .iter()
        .filter_map(|hit| {
            let ngo = hit.ngo()?;
            Some(NgoHit {
                id: hit.id,
                name: ngo.name,
                mission: ngo.mission_statement,
                countries: ngo.countries.unwrap_or_default(),
                city: ngo.address_city,
                similarity_score: hit.similarity_score,
            })
        })
        .collect();

    Ok(warp::reply::json(&NgoSearchResponse { count: ngos.len(), ngos }))
}
