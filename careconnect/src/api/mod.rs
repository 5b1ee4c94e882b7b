use governor::DefaultDirectRateLimiter;
use std::sync::Arc;
use uuid::Uuid;
use warp::{Filter, Rejection, Reply};

use crate::agents::graph::AgentGraph;
use crate::search::SemanticSearch;
use crate::store::FacilityStore;

mod agent;
mod deserts;
mod facilities;
mod search;
mod trust;

/// Everything the handlers need, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<AgentGraph>,
    pub facilities: Arc<dyn FacilityStore>,
    pub search: Arc<dyn SemanticSearch>,
    pub agent_limiter: Arc<DefaultDirectRateLimiter>,
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let agent_query_route = warp::path!("api" / "agent" / "query")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(agent::handle_query);

    let reset_thread_route = warp::path!("api" / "agent" / "threads" / String)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(agent::handle_reset);

    let thread_history_route = warp::path!("api" / "agent" / "threads" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(agent::handle_history);

    let facility_search_route = warp::path!("api" / "search" / "facilities")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(search::handle_search_facilities);

    let ngo_search_route = warp::path!("api" / "search" / "ngos")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(search::handle_search_ngos);

    let deserts_route = warp::path!("api" / "medical-deserts" / "analyze")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(deserts::handle_analyze);

    let facility_route = warp::path!("api" / "facilities" / Uuid)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(facilities::handle_get_facility);

    let trust_route = warp::path!("api" / "trust-score" / "calculate")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(trust::handle_calculate);

    let stats_route = warp::path!("api" / "stats" / "summary")
        .and(warp::get())
        .and(with_state(state))
        .and_then(facilities::handle_summary);

    agent_query_route
        .or(reset_thread_route)
        .or(thread_history_route)
        .or(facility_search_route)
        .or(ngo_search_route)
        .or(deserts_route)
        .or(facility_route)
        .or(trust_route)
        .or(stats_route)
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}
