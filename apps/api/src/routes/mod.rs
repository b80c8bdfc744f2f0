pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::profile::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/profile/submit", post(handlers::handle_submit))
        .route("/api/v1/profile", get(handlers::handle_get_profile))
        .route(
            "/api/v1/profile/visualization",
            get(handlers::handle_get_visualization),
        )
        .route(
            "/api/v1/model-statistics",
            get(handlers::handle_model_statistics),
        )
        .with_state(state)
}
