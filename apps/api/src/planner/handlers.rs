//! Axum route handlers for the Learning Path API.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::coverage::resolver::CoverageConfig;
use crate::errors::AppError;
use crate::models::path::LearningPathRow;
use crate::planner::pipeline::{generate_learning_path, PathRequest, PathResponse};
use crate::planner::sequencer::LearningPath;
use crate::state::AppState;

/// Job descriptions shorter than this carry too little signal to analyze.
const MIN_JD_CHARS: usize = 20;

#[derive(Debug, Serialize)]
pub struct PathDetailResponse {
    pub path_id: Uuid,
    pub user_id: Uuid,
    pub path: LearningPath,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// POST /api/v1/paths
///
/// Job-profile update entry point: runs the full pipeline synchronously and
/// returns the new learning path. Replaces any prior path for the user.
pub async fn handle_generate_path(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Result<Json<PathResponse>, AppError> {
    if request.job_description.trim().chars().count() < MIN_JD_CHARS {
        return Err(AppError::Validation(format!(
            "job_description must be at least {MIN_JD_CHARS} characters"
        )));
    }

    let cov_cfg = CoverageConfig::from(&state.config);
    let response = generate_learning_path(
        &state.db,
        state.llm.as_ref(),
        state.retriever.as_ref(),
        state.structure_cache.as_ref(),
        &state.role_templates,
        &cov_cfg,
        request,
    )
    .await?;

    Ok(Json(response))
}

/// GET /api/v1/paths/:user_id
///
/// Returns the user's active learning path from the DB.
pub async fn handle_get_path(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PathDetailResponse>, AppError> {
    let row = sqlx::query_as::<_, LearningPathRow>(
        "SELECT * FROM learning_paths WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("No learning path for user {user_id}")))?;

    let path: LearningPath = serde_json::from_value(row.payload)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Stored path is unreadable: {e}")))?;

    Ok(Json(PathDetailResponse {
        path_id: row.id,
        user_id: row.user_id,
        path,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}
