use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use super::AppState;
use crate::agents::graph::TurnHints;
use crate::error::ApiError;
use crate::models::{AgentQueryRequest, AgentQueryResponse, ThreadHistoryResponse};

pub async fn handle_query(request: AgentQueryRequest, state: AppState) -> Result<impl Reply, Rejection> {
    if state.agent_limiter.check().is_err() {
        warn!("Agent query rejected by rate limiter (thread {})", request.thread_id);
        return Err(warp::reject::custom(ApiError::RateLimitExceeded));
    }

    let query = request.query.trim();
    if query.is_empty() {
        return Err(warp::reject::custom(ApiError::BadRequest("query must not be empty".to_string())));
    }

    info!("Agent query on thread {}: {}", request.thread_id, query);

    let hints = TurnHints {
        region: request.region,
        facility: request.facility,
    };
    let outcome = state
        .graph
        .invoke(&request.thread_id, query, hints)
        .await
        .map_err(|e| {
            error!("Agent query failed on thread {}: {:#}", request.thread_id, e);
            warp::reject::custom(ApiError::Agent(e.to_string()))
        })?;

    Ok(warp::reply::json(&AgentQueryResponse {
        response: outcome.response,
        thread_id: request.thread_id,
        agents_used: outcome.agents_run.iter().map(|kind| kind.to_string()).collect(),
    }))
}

pub async fn handle_reset(thread_id: String, state: AppState) -> Result<impl Reply, Rejection> {
    state.graph.reset(&thread_id).await.map_err(|e| {
        error!("Failed to reset thread {}: {:#}", thread_id, e);
        warp::reject::custom(ApiError::InternalError(e.to_string()))
    })?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn handle_history(thread_id: String, state: AppState) -> Result<impl Reply, Rejection> {
    let conversation = state
        .graph
        .history(&thread_id)
        .await
        .map_err(|e| {
            error!("Failed to load thread {}: {:#}", thread_id, e);
            warp::reject::custom(ApiError::InternalError(e.to_string()))
        })?
        .ok_or_else(|| warp::reject::custom(ApiError::NotFound(format!("thread {}", thread_id))))?;

    Ok(warp::reply::json(&ThreadHistoryResponse {
        thread_id,
        messages: conversation.messages,
    }))
}
