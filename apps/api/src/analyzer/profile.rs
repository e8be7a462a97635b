//! Job Profile Analyzer — extracts a structured topic list from a raw job description.

use serde::{Deserialize, Serialize};

use crate::analyzer::prompts::{ANALYZE_PROMPT_TEMPLATE, ANALYZE_SYSTEM};
use crate::config::{normalize_role, RoleTemplates};
use crate::errors::{AppError, EngineError};
use crate::llm_client::{generate_json, GenerativeClient, LlmError, Tier};

/// Topic names this vague poison the Coverage Resolver — a vague topic
/// matches everything and nothing meaningfully. Extraction output is
/// scrubbed against this list after parsing.
pub const GENERIC_TOPIC_DENYLIST: &[&str] = &[
    "market knowledge",
    "data handling",
    "communication skills",
    "problem solving",
    "teamwork",
    "technical skills",
    "programming",
    "soft skills",
    "industry knowledge",
    "analytical skills",
    "attention to detail",
];

/// One skill the candidate must study, with retrieval keywords and the
/// role context it was extracted from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub keywords: Vec<String>,
    pub context: String,
}

/// Structured output of job-description analysis.
/// Immutable after creation except for the `role_type` backfill to "other".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProfile {
    pub role_type: String,
    pub seniority: String,
    /// Skills named verbatim in the job description.
    pub explicit_topics: Vec<Topic>,
    /// Skills the role typically requires but does not literally state.
    pub implicit_topics: Vec<Topic>,
}

impl JobProfile {
    /// All topics, explicit first. Order matters downstream: explicit topics
    /// anchor the coverage report the user sees first.
    pub fn all_topics(&self) -> impl Iterator<Item = &Topic> {
        self.explicit_topics.iter().chain(self.implicit_topics.iter())
    }

    pub fn topic_count(&self) -> usize {
        self.explicit_topics.len() + self.implicit_topics.len()
    }
}

/// Analyzes a job description via one structural-tier call (temperature 0)
/// and returns a validated `JobProfile`.
///
/// Unparsable output fails with `EngineError::AnalysisParse`; a partial
/// profile is never fabricated.
pub async fn analyze_job_description(
    jd_text: &str,
    seniority_hint: Option<&str>,
    templates: &RoleTemplates,
    llm: &dyn GenerativeClient,
) -> Result<JobProfile, AppError> {
    let hint = match seniority_hint {
        Some(s) if !s.trim().is_empty() => {
            format!(" The poster stated the seniority as \"{}\".", s.trim())
        }
        _ => String::new(),
    };
    let prompt = ANALYZE_PROMPT_TEMPLATE
        .replace("{jd_text}", jd_text)
        .replace("{role_vocabulary}", &templates.vocabulary().join(", "))
        .replace("{seniority_hint}", &hint);

    let raw: JobProfile = generate_json(llm, ANALYZE_SYSTEM, &prompt, Tier::Structural)
        .await
        .map_err(|e| match e {
            LlmError::Parse(parse) => {
                AppError::Engine(EngineError::AnalysisParse(parse.to_string()))
            }
            other => AppError::Llm(format!("Topic extraction call failed: {other}")),
        })?;

    validate_profile(raw, templates).map_err(AppError::Engine)
}

/// Scrubs generic topic names, normalizes the role type, and rejects
/// profiles left with no specific topics.
pub fn validate_profile(
    mut profile: JobProfile,
    templates: &RoleTemplates,
) -> Result<JobProfile, EngineError> {
    scrub_generic_topics(&mut profile.explicit_topics);
    scrub_generic_topics(&mut profile.implicit_topics);

    if profile.topic_count() == 0 {
        return Err(EngineError::AnalysisParse(
            "extraction produced no specific topics".to_string(),
        ));
    }

    // role_type backfill: anything outside the template vocabulary is "other"
    let normalized = normalize_role(&profile.role_type);
    profile.role_type = if templates.contains(&normalized) {
        normalized
    } else {
        "other".to_string()
    };

    if profile.seniority.trim().is_empty() {
        profile.seniority = "unknown".to_string();
    }

    Ok(profile)
}

fn scrub_generic_topics(topics: &mut Vec<Topic>) {
    topics.retain(|t| {
        let name = t.name.trim().to_lowercase();
        let generic = name.is_empty() || GENERIC_TOPIC_DENYLIST.contains(&name.as_str());
        if generic {
            tracing::warn!("Dropping generic extracted topic: '{}'", t.name);
        }
        !generic
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates() -> RoleTemplates {
        RoleTemplates::from_json_str(r#"["quantitative_researcher", "data_scientist"]"#).unwrap()
    }

    fn topic(name: &str) -> Topic {
        Topic {
            name: name.to_string(),
            keywords: vec!["k1".to_string(), "k2".to_string()],
            context: "from requirements".to_string(),
        }
    }

    #[test]
    fn test_profile_deserializes_from_extraction_json() {
        let json = r#"{
            "role_type": "quantitative_researcher",
            "seniority": "senior",
            "explicit_topics": [
                {
                    "name": "stochastic calculus",
                    "keywords": ["Ito's lemma", "Brownian motion"],
                    "context": "derivatives pricing"
                }
            ],
            "implicit_topics": [
                {
                    "name": "numerical linear algebra",
                    "keywords": ["eigenvalues"],
                    "context": "modeling work"
                }
            ]
        }"#;
        let profile: JobProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.role_type, "quantitative_researcher");
        assert_eq!(profile.topic_count(), 2);
        assert_eq!(profile.explicit_topics[0].name, "stochastic calculus");
    }

    #[test]
    fn test_generic_topic_names_are_scrubbed() {
        let profile = JobProfile {
            role_type: "quantitative_researcher".to_string(),
            seniority: "mid".to_string(),
            explicit_topics: vec![topic("options pricing"), topic("Market Knowledge")],
            implicit_topics: vec![topic("communication skills")],
        };
        let validated = validate_profile(profile, &templates()).unwrap();
        assert_eq!(validated.topic_count(), 1);
        for t in validated.all_topics() {
            assert!(!GENERIC_TOPIC_DENYLIST.contains(&t.name.to_lowercase().as_str()));
        }
    }

    #[test]
    fn test_all_generic_topics_is_a_parse_failure() {
        let profile = JobProfile {
            role_type: "other".to_string(),
            seniority: "mid".to_string(),
            explicit_topics: vec![topic("teamwork")],
            implicit_topics: vec![],
        };
        let err = validate_profile(profile, &templates()).unwrap_err();
        assert!(matches!(err, EngineError::AnalysisParse(_)));
    }

    #[test]
    fn test_unrecognized_role_type_backfills_to_other() {
        let profile = JobProfile {
            role_type: "Underwater Basket Weaver".to_string(),
            seniority: "senior".to_string(),
            explicit_topics: vec![topic("knot theory")],
            implicit_topics: vec![],
        };
        let validated = validate_profile(profile, &templates()).unwrap();
        assert_eq!(validated.role_type, "other");
    }

    #[test]
    fn test_template_role_type_is_normalized_not_backfilled() {
        let profile = JobProfile {
            role_type: "Quantitative Researcher".to_string(),
            seniority: "senior".to_string(),
            explicit_topics: vec![topic("time series analysis")],
            implicit_topics: vec![],
        };
        let validated = validate_profile(profile, &templates()).unwrap();
        assert_eq!(validated.role_type, "quantitative_researcher");
    }

    #[test]
    fn test_empty_seniority_defaults_to_unknown() {
        let profile = JobProfile {
            role_type: "other".to_string(),
            seniority: "  ".to_string(),
            explicit_topics: vec![topic("order book dynamics")],
            implicit_topics: vec![],
        };
        let validated = validate_profile(profile, &templates()).unwrap();
        assert_eq!(validated.seniority, "unknown");
    }

    #[test]
    fn test_all_topics_yields_explicit_before_implicit() {
        let profile = JobProfile {
            role_type: "other".to_string(),
            seniority: "mid".to_string(),
            explicit_topics: vec![topic("a")],
            implicit_topics: vec![topic("b")],
        };
        let names: Vec<_> = profile.all_topics().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
