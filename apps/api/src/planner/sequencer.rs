//! Learning Path Sequencer — partitions topics by coverage verdict and
//! orders covered topics into progressive stages.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyzer::profile::JobProfile;
use crate::coverage::resolver::CoverageResult;
use crate::errors::AppError;
use crate::llm_client::{generate_json, GenerativeClient, Tier};
use crate::planner::prompts::{SEQUENCE_PROMPT_TEMPLATE, SEQUENCE_SYSTEM};
use crate::planner::resources::{resources_for_topic, ExternalResource};

/// Max LLM retries when the stage plan fails validation.
const MAX_SEQUENCE_RETRIES: u32 = 1;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// One ordered phase of the learning path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub duration_weeks: u8,
    pub topics: Vec<String>,
}

/// A topic the corpus cannot ground, with curated fallback resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncoveredTopic {
    pub name: String,
    pub resources: Vec<ExternalResource>,
}

/// The personalized learning plan. One active path per user; replaced
/// wholesale on every job-profile update, never merged with a stale plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPath {
    pub job_description: String,
    pub role_type: String,
    pub stages: Vec<Stage>,
    pub covered_topics: Vec<String>,
    pub uncovered_topics: Vec<UncoveredTopic>,
    pub coverage_percentage: i32,
}

/// Parse target for the sequencing LLM call.
#[derive(Debug, Deserialize)]
struct StagePlan {
    stages: Vec<Stage>,
}

// ────────────────────────────────────────────────────────────────────────────
// Sequencing
// ────────────────────────────────────────────────────────────────────────────

/// Integer-rounded share of topics the corpus can ground.
pub fn coverage_percentage(covered: usize, uncovered: usize) -> i32 {
    let total = covered + uncovered;
    if total == 0 {
        return 0;
    }
    ((covered as f64 / total as f64) * 100.0).round() as i32
}

/// Splits coverage verdicts into covered names and uncovered topics with
/// their fallback resources attached.
pub fn partition_by_coverage(
    coverages: &[CoverageResult],
) -> (Vec<String>, Vec<UncoveredTopic>) {
    let mut covered = Vec::new();
    let mut uncovered = Vec::new();
    for result in coverages {
        if result.covered {
            covered.push(result.topic_name.clone());
        } else {
            uncovered.push(UncoveredTopic {
                name: result.topic_name.clone(),
                resources: resources_for_topic(&result.topic_name),
            });
        }
    }
    (covered, uncovered)
}

/// Builds the full learning path: partition, stage sequencing via the
/// structural tier, coverage percentage.
pub async fn sequence_path(
    jd_text: &str,
    profile: &JobProfile,
    coverages: &[CoverageResult],
    llm: &dyn GenerativeClient,
) -> Result<LearningPath, AppError> {
    let (covered, uncovered) = partition_by_coverage(coverages);
    let percentage = coverage_percentage(covered.len(), uncovered.len());

    let stages = if covered.is_empty() {
        info!("No covered topics — path has no stages");
        Vec::new()
    } else {
        sequence_stages(profile, &covered, llm).await?
    };

    Ok(LearningPath {
        job_description: jd_text.to_string(),
        role_type: profile.role_type.clone(),
        stages,
        covered_topics: covered,
        uncovered_topics: uncovered,
        coverage_percentage: percentage,
    })
}

/// One structural-tier call producing 3–5 interdependency-ordered stages,
/// retried once if the plan fails validation.
async fn sequence_stages(
    profile: &JobProfile,
    covered: &[String],
    llm: &dyn GenerativeClient,
) -> Result<Vec<Stage>, AppError> {
    let covered_set: HashSet<&str> = covered.iter().map(String::as_str).collect();

    let topics_json = serde_json::to_string_pretty(
        &profile
            .all_topics()
            .filter(|t| covered_set.contains(t.name.as_str()))
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "context": t.context,
                })
            })
            .collect::<Vec<_>>(),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize topics: {e}")))?;

    let prompt = SEQUENCE_PROMPT_TEMPLATE
        .replace("{topics_json}", &topics_json)
        .replace("{role_type}", &profile.role_type);

    for attempt in 0..=MAX_SEQUENCE_RETRIES {
        let plan: StagePlan = generate_json(llm, SEQUENCE_SYSTEM, &prompt, Tier::Structural)
            .await
            .map_err(|e| AppError::Llm(format!("Stage sequencing call failed: {e}")))?;

        let stages = normalize_stages(plan.stages, covered);
        if !stages.is_empty() {
            return Ok(stages);
        }

        warn!(
            "Sequencing attempt {}/{} produced no usable stages — retrying",
            attempt + 1,
            MAX_SEQUENCE_RETRIES + 1
        );
    }

    Err(AppError::Llm(format!(
        "Stage sequencing failed after {} attempts: plan contained no usable stages",
        MAX_SEQUENCE_RETRIES + 1
    )))
}

/// Drops stage topics the model invented, clamps durations, discards empty
/// stages, and appends any covered topics the model omitted to the final
/// stage so the path always accounts for every covered topic.
fn normalize_stages(stages: Vec<Stage>, covered: &[String]) -> Vec<Stage> {
    let covered_set: HashSet<&str> = covered.iter().map(String::as_str).collect();

    let mut normalized: Vec<Stage> = stages
        .into_iter()
        .filter_map(|mut stage| {
            stage.topics.retain(|t| covered_set.contains(t.as_str()));
            if stage.name.trim().is_empty() || stage.topics.is_empty() {
                return None;
            }
            stage.duration_weeks = stage.duration_weeks.clamp(1, 6);
            Some(stage)
        })
        .collect();

    if normalized.is_empty() {
        return normalized;
    }

    let assigned: HashSet<&str> = normalized
        .iter()
        .flat_map(|s| s.topics.iter().map(String::as_str))
        .collect();
    let missing: Vec<String> = covered
        .iter()
        .filter(|t| !assigned.contains(t.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        warn!("Sequencer omitted {} topics — appending to final stage", missing.len());
        if let Some(last) = normalized.last_mut() {
            last.topics.extend(missing);
        }
    }

    normalized
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::resolver::CoverageResult;

    fn verdict(name: &str, covered: bool) -> CoverageResult {
        CoverageResult {
            topic_name: name.to_string(),
            covered,
            confidence: if covered { 0.8 } else { 0.2 },
            best_source: None,
            all_sources: vec![],
        }
    }

    fn stage(name: &str, topics: &[&str]) -> Stage {
        Stage {
            name: name.to_string(),
            duration_weeks: 2,
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_coverage_percentage_seven_of_ten_is_70() {
        assert_eq!(coverage_percentage(7, 3), 70);
    }

    #[test]
    fn test_coverage_percentage_rounds_to_nearest_integer() {
        // 2/3 = 66.67 → 67
        assert_eq!(coverage_percentage(2, 1), 67);
        // 1/3 = 33.33 → 33
        assert_eq!(coverage_percentage(1, 2), 33);
    }

    #[test]
    fn test_coverage_percentage_empty_is_zero() {
        assert_eq!(coverage_percentage(0, 0), 0);
    }

    #[test]
    fn test_partition_attaches_resources_to_uncovered_only() {
        let coverages = vec![
            verdict("options pricing", true),
            verdict("ancient numismatics", false),
        ];
        let (covered, uncovered) = partition_by_coverage(&coverages);
        assert_eq!(covered, vec!["options pricing"]);
        assert_eq!(uncovered.len(), 1);
        assert_eq!(uncovered[0].name, "ancient numismatics");
        assert!(!uncovered[0].resources.is_empty());
    }

    #[test]
    fn test_normalize_drops_invented_topics_and_empty_stages() {
        let covered = vec!["a".to_string(), "b".to_string()];
        let stages = vec![
            stage("Foundation", &["a", "hallucinated"]),
            stage("Phantom", &["also fake"]),
        ];
        let normalized = normalize_stages(stages, &covered);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].name, "Foundation");
        // "b" was omitted by the model — appended to the final stage
        assert!(normalized[0].topics.contains(&"a".to_string()));
        assert!(normalized[0].topics.contains(&"b".to_string()));
    }

    #[test]
    fn test_normalize_clamps_duration_weeks() {
        let covered = vec!["a".to_string()];
        let mut s = stage("Foundation", &["a"]);
        s.duration_weeks = 40;
        let normalized = normalize_stages(vec![s], &covered);
        assert_eq!(normalized[0].duration_weeks, 6);
    }

    #[test]
    fn test_normalize_all_invalid_returns_empty() {
        let covered = vec!["a".to_string()];
        let normalized = normalize_stages(vec![stage("", &["a"])], &covered);
        assert!(normalized.is_empty());
    }

    #[test]
    fn test_learning_path_serde_round_trip() {
        let path = LearningPath {
            job_description: "Senior quant researcher role".to_string(),
            role_type: "quantitative_researcher".to_string(),
            stages: vec![stage("Foundation", &["probability theory"])],
            covered_topics: vec!["probability theory".to_string()],
            uncovered_topics: vec![UncoveredTopic {
                name: "firm-specific tooling".to_string(),
                resources: resources_for_topic("firm-specific tooling"),
            }],
            coverage_percentage: 50,
        };
        let value = serde_json::to_value(&path).unwrap();
        let recovered: LearningPath = serde_json::from_value(value).unwrap();
        assert_eq!(recovered.coverage_percentage, 50);
        assert_eq!(recovered.stages[0].topics, vec!["probability theory"]);
    }
}
