pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::cache::handlers as cache_handlers;
use crate::coverage::handlers as coverage_handlers;
use crate::planner::handlers as planner_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Learning Path API
        .route("/api/v1/paths", post(planner_handlers::handle_generate_path))
        .route(
            "/api/v1/paths/:user_id",
            get(planner_handlers::handle_get_path),
        )
        // Coverage API
        .route(
            "/api/v1/coverage",
            post(coverage_handlers::handle_coverage_check),
        )
        // Lazy cache endpoints
        .route(
            "/api/v1/topics/structure",
            post(cache_handlers::handle_topic_structure),
        )
        .route(
            "/api/v1/topics/sections",
            post(cache_handlers::handle_section_content),
        )
        .with_state(state)
}
