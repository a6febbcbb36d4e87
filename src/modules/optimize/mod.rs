use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::post;
use axum::Router;

pub mod body;
pub mod dto;
pub mod handler;

pub fn router(state: AppState) -> Router<AppState> {
    // The upload gatekeeper enforces the per-file limit itself.
    Router::new()
        .route("/optimize", post(handler::optimize_video))
        .layer(DefaultBodyLimit::disable())
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth::api_key_auth,
        ))
}
