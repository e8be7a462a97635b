//! Learning-path pipeline — orchestrates the full flow.
//!
//! Flow: analyze JD → resolve coverage per topic → sequence stages →
//!       persist (hard overwrite) → attach topic structures.
//!
//! Per-topic structure failures are isolated: a path with N topics where one
//! structure generation fails still renders N−1 functioning topics plus one
//! "content unavailable" marker, never a blank page.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analyzer::profile::{analyze_job_description, JobProfile};
use crate::cache::structure::{TopicStructureCache, TopicStructureEntry};
use crate::cache::MAX_GROUNDING_CHUNKS;
use crate::config::RoleTemplates;
use crate::coverage::resolver::{resolve_topic, CoverageConfig, CoverageResult};
use crate::errors::{AppError, EngineError};
use crate::llm_client::GenerativeClient;
use crate::planner::sequencer::{sequence_path, LearningPath};
use crate::retrieval::Retriever;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Request body for a job-profile update.
#[derive(Debug, Clone, Deserialize)]
pub struct PathRequest {
    pub user_id: Uuid,
    pub job_title: Option<String>,
    pub job_description: String,
    pub job_seniority: Option<String>,
    pub firm: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicReportStatus {
    Ready,
    Unavailable,
}

/// Per-covered-topic outcome of structure generation.
#[derive(Debug, Clone, Serialize)]
pub struct TopicReport {
    pub topic_name: String,
    pub status: TopicReportStatus,
    /// Populated for unavailable topics: why, and that retry is worthwhile.
    pub detail: Option<String>,
    pub structure: Option<TopicStructureEntry>,
}

/// Response from the pipeline.
#[derive(Debug, Serialize)]
pub struct PathResponse {
    pub path_id: Uuid,
    pub path: LearningPath,
    pub topic_reports: Vec<TopicReport>,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs the full learning-path pipeline and persists the result.
///
/// Steps:
/// 1. analyze_job_description() → JobProfile
/// 2. resolve_topic() per topic → Vec<CoverageResult> (retrieval failures
///    propagate as CoverageUnavailable — never silently "uncovered")
/// 3. sequence_path() → LearningPath
/// 4. UPSERT into learning_paths (hard overwrite of the user's prior path)
/// 5. attach_structures() → per-topic reports with failure isolation
pub async fn generate_learning_path(
    pool: &PgPool,
    llm: &dyn GenerativeClient,
    retriever: &dyn Retriever,
    structure_cache: &TopicStructureCache,
    templates: &RoleTemplates,
    cov_cfg: &CoverageConfig,
    request: PathRequest,
) -> Result<PathResponse, AppError> {
    let jd_text = compose_jd_text(
        request.job_title.as_deref(),
        request.firm.as_deref(),
        &request.job_description,
    );

    // Step 1: extract the topic profile
    info!("Analyzing job description for user {}", request.user_id);
    let profile = analyze_job_description(
        &jd_text,
        request.job_seniority.as_deref(),
        templates,
        llm,
    )
    .await?;
    info!(
        "Extracted {} topics (role_type={})",
        profile.topic_count(),
        profile.role_type
    );

    // Step 2: resolve coverage topic by topic
    let mut coverages = Vec::with_capacity(profile.topic_count());
    for topic in profile.all_topics() {
        let coverage = resolve_topic(&topic.name, &topic.keywords, retriever, cov_cfg).await?;
        coverages.push(coverage);
    }

    // Step 3: sequence stages
    let path = sequence_path(&request.job_description, &profile, &coverages, llm).await?;
    info!(
        "Sequenced {} stages, coverage {}%",
        path.stages.len(),
        path.coverage_percentage
    );

    // Step 4: hard overwrite of the user's active path
    let path_id = persist_path(pool, request.user_id, &path).await?;

    // Step 5: attach structures, isolating per-topic failures
    let topic_reports = attach_structures(&profile, &coverages, structure_cache).await?;

    Ok(PathResponse {
        path_id,
        path,
        topic_reports,
    })
}

/// Folds the optional title and firm into the analyzed text so extraction
/// sees everything the poster provided.
pub fn compose_jd_text(job_title: Option<&str>, firm: Option<&str>, description: &str) -> String {
    let mut text = String::new();
    if let Some(title) = job_title.filter(|t| !t.trim().is_empty()) {
        text.push_str(&format!("Position: {}\n", title.trim()));
    }
    if let Some(firm) = firm.filter(|f| !f.trim().is_empty()) {
        text.push_str(&format!("Firm: {}\n", firm.trim()));
    }
    text.push_str(description);
    text
}

/// Replaces (never appends to) the user's active learning path.
async fn persist_path(
    pool: &PgPool,
    user_id: Uuid,
    path: &LearningPath,
) -> Result<Uuid, AppError> {
    let payload = serde_json::to_value(path)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize path: {e}")))?;

    let (path_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO learning_paths
            (id, user_id, job_description, role_type, payload, coverage_percentage)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id) DO UPDATE SET
            job_description = EXCLUDED.job_description,
            role_type = EXCLUDED.role_type,
            payload = EXCLUDED.payload,
            coverage_percentage = EXCLUDED.coverage_percentage,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&path.job_description)
    .bind(&path.role_type)
    .bind(&payload)
    .bind(path.coverage_percentage)
    .fetch_one(pool)
    .await?;

    info!("Persisted learning path {path_id} for user {user_id}");
    Ok(path_id)
}

/// Generates (or fetches) the weekly structure for every covered topic.
///
/// `StructureGenerationFailed` is contained to its topic; any other error
/// (store, transport) aborts, since it would affect every topic equally.
pub async fn attach_structures(
    profile: &JobProfile,
    coverages: &[CoverageResult],
    cache: &TopicStructureCache,
) -> Result<Vec<TopicReport>, AppError> {
    let mut reports = Vec::new();

    for coverage in coverages.iter().filter(|c| c.covered) {
        let keywords = profile
            .all_topics()
            .find(|t| t.name == coverage.topic_name)
            .map(|t| t.keywords.clone())
            .unwrap_or_default();
        let grounding = coverage.grounding_chunks(MAX_GROUNDING_CHUNKS);

        match cache
            .get_or_generate(&profile.role_type, &coverage.topic_name, &keywords, &grounding)
            .await
        {
            Ok(entry) => reports.push(TopicReport {
                topic_name: coverage.topic_name.clone(),
                status: TopicReportStatus::Ready,
                detail: None,
                structure: Some(entry),
            }),
            Err(AppError::Engine(EngineError::StructureGenerationFailed { topic, reason })) => {
                warn!("Structure unavailable for '{topic}': {reason}");
                reports.push(TopicReport {
                    topic_name: coverage.topic_name.clone(),
                    status: TopicReportStatus::Unavailable,
                    detail: Some("content unavailable, retry".to_string()),
                    structure: None,
                });
            }
            Err(other) => return Err(other),
        }
    }

    Ok(reports)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
