use tracing::{error, info};
use warp::{Rejection, Reply};

use super::AppState;
use crate::agents::medical_desert::{analyze_regions, RegionalAnalysis};
use crate::error::ApiError;

pub(super) async fn regional_analysis(state: &AppState) -> Result<Option<RegionalAnalysis>, Rejection> {
    let regions = state.facilities.aggregate_by_region().await.map_err(|e| {
        error!("Regional aggregation failed: {}", e);
        warp::reject::custom(ApiError::Store(e))
    })?;
    Ok(analyze_regions(regions))
}

pub async fn handle_analyze(state: AppState) -> Result<impl Reply, Rejection> {
    let analysis = regional_analysis(&state)
        .await?
        .ok_or_else(|| warp::reject::custom(ApiError::NotFound("no regional data available".to_string())))?;

    info!(
        "Desert analysis: {} of {} regions below {:.1} facilities",
        analysis.medical_deserts.len(),
        analysis.total_regions,
        analysis.desert_threshold
    );

    Ok(warp::reply::json(&analysis))
}
