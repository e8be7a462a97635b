//! Axum route handlers for the lazy cache endpoints.
//!
//! Structures and section contents are generated on demand, not during the
//! path pipeline's synchronous window. Each handler retrieves grounding once
//! and hands the retained chunks to the cache — the cache itself never
//! re-retrieves.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::cache::content::SectionContentEntry;
use crate::cache::structure::TopicStructureEntry;
use crate::cache::MAX_GROUNDING_CHUNKS;
use crate::coverage::resolver::{resolve_topic, CoverageConfig};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StructureRequest {
    pub role_type: Option<String>,
    pub topic_name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StructureResponse {
    pub covered: bool,
    pub confidence: f32,
    pub entry: TopicStructureEntry,
}

#[derive(Debug, Deserialize)]
pub struct SectionRequest {
    pub role_type: Option<String>,
    pub topic_name: String,
    pub section_id: String,
    pub section_title: String,
}

/// POST /api/v1/topics/structure
///
/// Returns the weekly outline for a topic, generating and caching it on
/// first request.
pub async fn handle_topic_structure(
    State(state): State<AppState>,
    Json(request): Json<StructureRequest>,
) -> Result<Json<StructureResponse>, AppError> {
    if request.topic_name.trim().is_empty() {
        return Err(AppError::Validation("topic_name cannot be empty".to_string()));
    }

    let cov_cfg = CoverageConfig::from(&state.config);
    let coverage = resolve_topic(
        &request.topic_name,
        &request.keywords,
        state.retriever.as_ref(),
        &cov_cfg,
    )
    .await?;

    let role_type = request.role_type.as_deref().unwrap_or("other");
    let entry = state
        .structure_cache
        .get_or_generate(
            role_type,
            &request.topic_name,
            &request.keywords,
            &coverage.grounding_chunks(MAX_GROUNDING_CHUNKS),
        )
        .await?;

    Ok(Json(StructureResponse {
        covered: coverage.covered,
        confidence: coverage.confidence,
        entry,
    }))
}

/// POST /api/v1/topics/sections
///
/// Returns the long-form study material for one outline section, generating
/// and caching it on first request.
pub async fn handle_section_content(
    State(state): State<AppState>,
    Json(request): Json<SectionRequest>,
) -> Result<Json<SectionContentEntry>, AppError> {
    if request.topic_name.trim().is_empty() || request.section_title.trim().is_empty() {
        return Err(AppError::Validation(
            "topic_name and section_title cannot be empty".to_string(),
        ));
    }

    // Ground on material matching the section, not just the topic.
    let cov_cfg = CoverageConfig::from(&state.config);
    let coverage = resolve_topic(
        &request.topic_name,
        std::slice::from_ref(&request.section_title),
        state.retriever.as_ref(),
        &cov_cfg,
    )
    .await?;

    let role_type = request.role_type.as_deref().unwrap_or("other");
    let entry = state
        .content_cache
        .get_or_generate(
            role_type,
            &request.topic_name,
            &request.section_id,
            &request.section_title,
            &coverage.grounding_chunks(MAX_GROUNDING_CHUNKS),
        )
        .await?;

    Ok(Json(entry))
}
