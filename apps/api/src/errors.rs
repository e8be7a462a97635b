use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures produced by the coverage/generation engine itself, as opposed to
/// transport or persistence plumbing. Carried inside `AppError` so handlers
/// can return either.
///
/// Per-topic and per-section failures are isolated by callers: one failing
/// topic never aborts the rest of a learning path.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Topic extraction returned unparsable output: {0}")]
    AnalysisParse(String),

    #[error("Retrieval unavailable while resolving '{topic}': {reason}")]
    CoverageUnavailable { topic: String, reason: String },

    #[error("Structure generation failed for topic '{topic}': {reason}")]
    StructureGenerationFailed { topic: String, reason: String },

    #[error("Content generation failed for '{topic}' section '{section_id}': {reason}")]
    ContentGenerationFailed {
        topic: String,
        section_id: String,
        reason: String,
    },

    #[error("Cache write conflict on key '{0}'")]
    CacheWriteConflict(String),
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Engine(engine) => {
                tracing::error!("Engine error: {engine}");
                let (status, code) = match engine {
                    EngineError::AnalysisParse(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "ANALYSIS_PARSE_ERROR")
                    }
                    EngineError::CoverageUnavailable { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "COVERAGE_UNAVAILABLE")
                    }
                    EngineError::StructureGenerationFailed { .. } => {
                        (StatusCode::BAD_GATEWAY, "STRUCTURE_GENERATION_FAILED")
                    }
                    EngineError::ContentGenerationFailed { .. } => {
                        (StatusCode::BAD_GATEWAY, "CONTENT_GENERATION_FAILED")
                    }
                    EngineError::CacheWriteConflict(_) => {
                        (StatusCode::CONFLICT, "CACHE_WRITE_CONFLICT")
                    }
                };
                (status, code, engine.to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_unavailable_names_topic() {
        let err = EngineError::CoverageUnavailable {
            topic: "stochastic calculus".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("stochastic calculus"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_content_failure_names_topic_and_section() {
        let err = EngineError::ContentGenerationFailed {
            topic: "options pricing".to_string(),
            section_id: "w1s2".to_string(),
            reason: "malformed JSON".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("options pricing"));
        assert!(msg.contains("w1s2"));
    }
}
