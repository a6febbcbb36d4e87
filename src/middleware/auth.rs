use crate::common::response::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::info;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Exact match against the configured secret. A missing header never matches.
pub fn is_authorized(provided: Option<&str>, expected: &str) -> bool {
    matches!(provided, Some(key) if key == expected)
}

pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !is_authorized(provided, &state.config.api_key) {
        info!(path = %req.uri().path(), "rejected request with missing or invalid api key");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}
