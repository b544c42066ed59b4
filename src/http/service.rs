//! HTTP routes in front of the token bucket limiter.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::error::QuotaError;
use crate::ratelimit::{Decision, TokenBucketLimiter};

/// Header carrying the caller identity.
pub const USER_ID_HEADER: &str = "user-id";

/// Request failures and their HTTP status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    TooManyRequests(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::InvalidArgument(msg) => ApiError::BadRequest(msg),
            QuotaError::StoreUnavailable(_) => {
                ApiError::ServiceUnavailable("Rate limiter service unavailable".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Build the router serving `/` and `/limited-resource`.
pub fn router(limiter: Arc<TokenBucketLimiter>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/limited-resource", get(limited_resource))
        .with_state(limiter)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": format!(
            "Rate limiter API is running. Use /limited-resource with '{}' header.",
            USER_ID_HEADER
        )
    }))
}

/// Admit or reject one request for the identity in the `user-id` header.
#[instrument(skip_all)]
async fn limited_resource(
    State(limiter): State<Arc<TokenBucketLimiter>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if user_id.is_empty() {
        warn!("Received request without user id");
        return Err(ApiError::BadRequest(format!(
            "{} header is required",
            USER_ID_HEADER
        )));
    }

    let decision = limiter.check(user_id, 1).await?;

    info!(user_id = %user_id, decision = ?decision, "Rate limit decision made");

    match decision {
        Decision::Admitted => Ok(Json(json!({
            "message": "Request allowed",
            "user_id": user_id,
        }))),
        Decision::Denied => Err(ApiError::TooManyRequests(
            "Rate limit exceeded. Try again later.".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failure_maps_to_service_unavailable() {
        let err = ApiError::from(QuotaError::StoreUnavailable("connection reset".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_argument_maps_to_bad_request() {
        let err = ApiError::from(QuotaError::InvalidArgument("cost must be at least 1".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_denial_status() {
        let response = ApiError::TooManyRequests("slow down".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
