use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Row in `learning_paths` — one active path per user, hard-overwritten on
/// every job-profile update. `payload` is the serialized `LearningPath`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LearningPathRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_description: String,
    pub role_type: String,
    pub payload: serde_json::Value,
    pub coverage_percentage: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
