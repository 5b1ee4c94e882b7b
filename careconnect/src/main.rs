use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warp::Filter;

mod agents;
mod api;
mod config;
mod conversation;
mod db;
mod error;
mod llm;
mod metrics;
mod middleware;
mod models;
mod redis_client;
mod search;
mod store;
#[cfg(test)]
mod testing;

use crate::config::ConversationBackend;
use crate::conversation::{ConversationStore, InMemoryConversationStore, RedisConversationStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so LOG_LEVEL can seed the filter
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("Starting CareConnect agent service");

    let db_pool = db::create_pool(
        &config.database_url,
        config.db_max_connections,
        config.db_acquire_timeout_secs,
    )
    .await?;
    info!("Database connection pool created");

    sqlx::migrate!("./migrations").run(&db_pool).await?;
    info!("Database migrations applied");

    let conversations: Arc<dyn ConversationStore> = match config.conversation_store {
        ConversationBackend::Memory => {
            info!("Using in-memory conversation store");
            Arc::new(InMemoryConversationStore::new())
        }
        ConversationBackend::Redis => {
            let redis_client = redis_client::RedisClient::connect(
                &config.redis_url,
                RedisConversationStore::NAMESPACE,
            )
            .await?;
            info!("Redis connection established");
            Arc::new(RedisConversationStore::new(redis_client, config.conversation_ttl_secs))
        }
    };

    if config.openai_api_key.is_none() {
        info!("OPENAI_API_KEY not set; generation will use deterministic fallbacks");
    }
    let llm = Arc::new(llm::OpenAiClient::new(
        &config.openai_base_url,
        config.openai_api_key.clone(),
        &config.chat_model,
        &config.embedding_model,
        Duration::from_secs(config.llm_timeout_secs),
    )?);

    let facilities = Arc::new(store::PgFacilityStore::new(db_pool.clone()));
    let search = Arc::new(search::PgVectorSearch::new(
        db_pool.clone(),
        llm.clone(),
        config.embedding_dimensions,
    ));
    let graph = agents::graph::AgentGraph::new(llm, facilities.clone(), search.clone(), conversations);

    let per_minute = NonZeroU32::new(config.agent_rate_limit_per_minute)
        .ok_or_else(|| anyhow::anyhow!("AGENT_RATE_LIMIT_PER_MINUTE must be positive"))?;

    let state = api::AppState {
        graph: Arc::new(graph),
        facilities,
        search,
        agent_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
    };

    let api_routes = api::routes(state)
        .with(warp::log("api"))
        .with(middleware::cors());

    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    let metrics_route = warp::path("metrics").and(warp::get()).and_then(|| async {
        metrics::render()
            .map(|body| warp::reply::with_header(body, "Content-Type", "text/plain; version=0.0.4"))
            .map_err(|e| warp::reject::custom(error::ApiError::InternalError(e.to_string())))
    });

    let routes = health
        .or(metrics_route)
        .or(api_routes)
        .recover(error::handle_rejection);

    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", config.port);

    warp::serve(routes).run(addr).await;

    Ok(())
}
