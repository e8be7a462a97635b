//! Axum route handlers for the Coverage API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::coverage::resolver::{resolve_topic, CoverageConfig, CoverageResult};
use crate::errors::AppError;
use crate::planner::resources::{resources_for_topic, ExternalResource};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CoverageCheckRequest {
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CoverageCheckResponse {
    pub coverage: CoverageResult,
    /// Curated fallback resources, populated only when the topic is uncovered.
    pub external_resources: Vec<ExternalResource>,
}

/// POST /api/v1/coverage
///
/// Resolves a single topic against the indexed corpus. Uncovered topics come
/// back with curated external resources so the caller always has something
/// to show.
pub async fn handle_coverage_check(
    State(state): State<AppState>,
    Json(request): Json<CoverageCheckRequest>,
) -> Result<Json<CoverageCheckResponse>, AppError> {
    if request.topic.trim().is_empty() {
        return Err(AppError::Validation("topic cannot be empty".to_string()));
    }

    let cfg = CoverageConfig::from(&state.config);
    let coverage = resolve_topic(
        &request.topic,
        &request.keywords,
        state.retriever.as_ref(),
        &cfg,
    )
    .await?;

    let external_resources = if coverage.covered {
        Vec::new()
    } else {
        resources_for_topic(&request.topic)
    };

    Ok(Json(CoverageCheckResponse {
        coverage,
        external_resources,
    }))
}
