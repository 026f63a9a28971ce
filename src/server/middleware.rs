use super::handlers::{AppState, failure_response};
use super::types::ErrorResponse;
use crate::Error;
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};

/// Admits prediction requests through the per-flow rate limiter.
pub async fn rate_limit(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    request: Request,
    next: Next,
) -> Response {
    match state.rate_limiter.check(&flow_id) {
        Ok(()) => next.run(request).await,
        Err(Error::RateLimited(message)) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::new(message)),
        )
            .into_response(),
        Err(e) => failure_response(StatusCode::INTERNAL_SERVER_ERROR, &e, state.development()),
    }
}
