use thiserror::Error;
use warp::http::StatusCode;
use warp::{reject::Reject, Reply, Rejection};

use crate::llm::LlmError;

/// Failures of the facility store or the vector index behind it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] LlmError),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

impl Reject for ApiError {}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Resource not found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            ApiError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        }
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    let (code, message, detail) = if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = api_err.status();
        (code, message, api_err.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Resource not found", "no such route".to_string())
    } else if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "Bad request", body_err.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            "method not allowed".to_string(),
        )
    } else if let Some(param_err) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, "Bad request", param_err.to_string())
    } else {
        return Err(err);
    };

    let json = warp::reply::json(&serde_json::json!({
        "error": message,
        "detail": detail,
    }));

    Ok(warp::reply::with_status(json, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn api_errors_map_to_status_and_detail() {
        let rejection = warp::reject::custom(ApiError::NotFound("facility 42".to_string()));
        let reply = handle_rejection(rejection).await.ok().unwrap().into_response();
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);

        let rejection = warp::reject::custom(ApiError::RateLimitExceeded);
        let reply = handle_rejection(rejection).await.ok().unwrap().into_response();
        assert_eq!(reply.status(), StatusCode::TOO_MANY_REQUESTS);

        let rejection = warp::reject::custom(ApiError::Agent("boom".to_string()));
        let reply = handle_rejection(rejection).await.ok().unwrap().into_response();
        assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn agent_errors_carry_their_detail() {
        let err = ApiError::Agent("connection refused".to_string());
        assert_eq!(err.to_string(), "Agent error: connection refused");
    }
}
