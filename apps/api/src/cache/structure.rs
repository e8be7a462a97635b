//! Topic Structure Cache — weekly/section outlines, generated once per key
//! on the structural tier and served from the durable store thereafter.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::inflight::{
    wait_for_entry, Acquisition, Inflight, INFLIGHT_TTL_SECS, POLL_INTERVAL,
};
use crate::cache::keys::structure_key;
use crate::cache::prompts::{STRUCTURE_PROMPT_TEMPLATE, STRUCTURE_SYSTEM};
use crate::cache::store::{CacheRecord, CacheStore, CacheTable};
use crate::cache::{build_context_block, CONTENT_VERSION};
use crate::config::RoleTemplates;
use crate::coverage::resolver::ChunkRef;
use crate::errors::{AppError, EngineError};
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, SPECIFICITY_INSTRUCTION};
use crate::llm_client::{generate_json, GenerativeClient, Tier, STRUCTURAL_MODEL};

/// One retry on malformed output, then the failure surfaces.
const MAX_GENERATION_RETRIES: u32 = 1;

/// Title prefixes the outline prompt forbids; enforced at validation too.
const GENERIC_TITLE_PREFIXES: &[&str] =
    &["introduction to", "overview of", "basics of", "fundamentals of"];

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureSection {
    /// Engine-assigned, stable across regenerations of the same shape
    /// ("w2s1"). Keys the Section Content Cache.
    pub section_id: String,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureWeek {
    pub week_number: u32,
    pub title: String,
    pub sections: Vec<StructureSection>,
}

/// The cached outline payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicStructure {
    pub weeks: Vec<StructureWeek>,
    pub estimated_hours: u32,
    pub difficulty_level: String,
    pub source_books: Vec<String>,
}

/// What callers receive. `cached` distinguishes first-generation latency
/// from cache-hit latency in telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct TopicStructureEntry {
    pub cache_key: String,
    pub structure: TopicStructure,
    pub generation_model: String,
    pub content_version: i32,
    pub access_count: i64,
    pub cached: bool,
}

// Parse targets for the LLM reply; ids and week numbers are assigned by the
// engine after validation, never trusted from the model.

#[derive(Debug, Deserialize)]
struct RawStructure {
    weeks: Vec<RawWeek>,
    estimated_hours: u32,
    difficulty_level: String,
    #[serde(default)]
    source_books: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawWeek {
    title: String,
    sections: Vec<RawSection>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    title: String,
    summary: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Cache
// ────────────────────────────────────────────────────────────────────────────

/// Content-addressed cache in front of outline generation.
pub struct TopicStructureCache {
    store: Arc<dyn CacheStore>,
    llm: Arc<dyn GenerativeClient>,
    inflight: Arc<dyn Inflight>,
    templates: Arc<RoleTemplates>,
}

impl TopicStructureCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        llm: Arc<dyn GenerativeClient>,
        inflight: Arc<dyn Inflight>,
        templates: Arc<RoleTemplates>,
    ) -> Self {
        Self {
            store,
            llm,
            inflight,
            templates,
        }
    }

    /// Returns the cached outline for (role, topic, keywords), generating it
    /// on first miss from the supplied grounding chunks.
    ///
    /// Grounding chunks come from the Coverage Resolver's retained
    /// `chunk_refs` — the cache never re-retrieves.
    pub async fn get_or_generate(
        &self,
        role_type: &str,
        topic_name: &str,
        keywords: &[String],
        grounding: &[ChunkRef],
    ) -> Result<TopicStructureEntry, AppError> {
        let key = structure_key(&self.templates, role_type, topic_name, keywords);

        if let Some(entry) = self.read_hit(&key).await? {
            return Ok(entry);
        }

        // Miss. If another request is generating this key, wait for its
        // write to land instead of paying for a duplicate call.
        if self.inflight.acquire(&key).await == Acquisition::Busy {
            info!("Waiting on in-flight structure generation for '{topic_name}'");
            let landed = wait_for_entry(
                self.store.as_ref(),
                CacheTable::TopicStructure,
                &key,
                Duration::from_secs(INFLIGHT_TTL_SECS),
                POLL_INTERVAL,
            )
            .await?;
            if landed {
                if let Some(entry) = self.read_hit(&key).await? {
                    return Ok(entry);
                }
            }
            // The winner died or its sentinel expired — generate ourselves.
        }

        // Generation and the cache write run on a detached task: if this
        // request is abandoned mid-generation, the work still completes and
        // populates the cache for the next requester.
        let task = tokio::spawn(finish_generation(
            self.store.clone(),
            self.llm.clone(),
            self.inflight.clone(),
            key,
            topic_name.to_string(),
            keywords.to_vec(),
            grounding.to_vec(),
        ));
        task.await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Generation task panicked: {e}")))?
    }

    /// Cache-hit path: touch the access count and decode the payload.
    /// An undecodable payload is treated as a miss so it can be regenerated.
    async fn read_hit(&self, key: &str) -> Result<Option<TopicStructureEntry>, AppError> {
        let Some(record) = self
            .store
            .fetch_and_touch(CacheTable::TopicStructure, key)
            .await?
        else {
            return Ok(None);
        };
        match serde_json::from_value::<TopicStructure>(record.payload.clone()) {
            Ok(structure) => Ok(Some(TopicStructureEntry {
                cache_key: record.cache_key,
                structure,
                generation_model: record.generation_model,
                content_version: record.content_version,
                access_count: record.access_count,
                cached: true,
            })),
            Err(e) => {
                warn!("Cached structure under '{key}' is unreadable ({e}) — regenerating");
                Ok(None)
            }
        }
    }
}

/// Generates, persists, and resolves write races. Runs detached from the
/// request so client disconnects never waste a paid generation.
async fn finish_generation(
    store: Arc<dyn CacheStore>,
    llm: Arc<dyn GenerativeClient>,
    inflight: Arc<dyn Inflight>,
    key: String,
    topic_name: String,
    keywords: Vec<String>,
    grounding: Vec<ChunkRef>,
) -> Result<TopicStructureEntry, AppError> {
    let generated = generate(llm.as_ref(), &topic_name, &keywords, &grounding).await;
    inflight.release(&key).await;
    let structure = generated?;

    let payload = serde_json::to_value(&structure)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize outline: {e}")))?;
    let record = CacheRecord {
        cache_key: key.clone(),
        payload,
        generation_model: STRUCTURAL_MODEL.to_string(),
        content_version: CONTENT_VERSION,
        access_count: 1,
    };

    if store
        .insert_if_absent(CacheTable::TopicStructure, &record)
        .await?
    {
        info!("Cached new structure for '{topic_name}' under {key}");
        return Ok(TopicStructureEntry {
            cache_key: key,
            structure,
            generation_model: record.generation_model,
            content_version: record.content_version,
            access_count: 1,
            cached: false,
        });
    }

    // Lost the write race: first writer wins, re-read the winning entry.
    match store.fetch_and_touch(CacheTable::TopicStructure, &key).await? {
        Some(winner) => match serde_json::from_value::<TopicStructure>(winner.payload.clone()) {
            Ok(winning_structure) => Ok(TopicStructureEntry {
                cache_key: winner.cache_key,
                structure: winning_structure,
                generation_model: winner.generation_model,
                content_version: winner.content_version,
                access_count: winner.access_count,
                cached: false,
            }),
            Err(e) => {
                warn!("Winning entry for '{key}' is unreadable ({e}) — serving own result uncached");
                Ok(TopicStructureEntry {
                    cache_key: key,
                    structure,
                    generation_model: record.generation_model,
                    content_version: record.content_version,
                    access_count: 1,
                    cached: false,
                })
            }
        },
        None => Err(EngineError::CacheWriteConflict(key).into()),
    }
}

/// One structural-tier call, retried once on malformed or invalid output.
async fn generate(
    llm: &dyn GenerativeClient,
    topic_name: &str,
    keywords: &[String],
    grounding: &[ChunkRef],
) -> Result<TopicStructure, AppError> {
    let prompt = STRUCTURE_PROMPT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{specificity_instruction}", SPECIFICITY_INSTRUCTION)
        .replace("{topic_name}", topic_name)
        .replace("{keywords}", &keywords.join(", "))
        .replace("{grounding}", &build_context_block(grounding));

    let mut last_reason = String::new();

    for attempt in 0..=MAX_GENERATION_RETRIES {
        match generate_json::<RawStructure>(llm, STRUCTURE_SYSTEM, &prompt, Tier::Structural).await
        {
            Ok(raw) => match validate_structure(&raw) {
                Ok(()) => return Ok(assign_section_ids(raw)),
                Err(reason) => {
                    warn!(
                        "Structure for '{}' invalid on attempt {}/{}: {}",
                        topic_name,
                        attempt + 1,
                        MAX_GENERATION_RETRIES + 1,
                        reason
                    );
                    last_reason = reason;
                }
            },
            Err(e) => {
                warn!(
                    "Structure call for '{}' failed on attempt {}/{}: {}",
                    topic_name,
                    attempt + 1,
                    MAX_GENERATION_RETRIES + 1,
                    e
                );
                last_reason = e.to_string();
            }
        }
    }

    Err(EngineError::StructureGenerationFailed {
        topic: topic_name.to_string(),
        reason: last_reason,
    }
    .into())
}

/// Malformed structures are never cached: at least one week, every week has
/// sections, every section carries a concrete title.
fn validate_structure(raw: &RawStructure) -> Result<(), String> {
    if raw.weeks.is_empty() {
        return Err("outline has no weeks".to_string());
    }
    for (wi, week) in raw.weeks.iter().enumerate() {
        if week.title.trim().is_empty() {
            return Err(format!("week {} has no title", wi + 1));
        }
        if week.sections.is_empty() {
            return Err(format!("week {} has no sections", wi + 1));
        }
        for section in &week.sections {
            let title = section.title.trim();
            if title.is_empty() {
                return Err(format!("week {} has a section missing a title", wi + 1));
            }
            let lowered = title.to_lowercase();
            if GENERIC_TITLE_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
                return Err(format!("generic section title '{title}'"));
            }
        }
    }
    Ok(())
}

fn assign_section_ids(raw: RawStructure) -> TopicStructure {
    TopicStructure {
        weeks: raw
            .weeks
            .into_iter()
            .enumerate()
            .map(|(wi, week)| StructureWeek {
                week_number: (wi + 1) as u32,
                title: week.title,
                sections: week
                    .sections
                    .into_iter()
                    .enumerate()
                    .map(|(si, section)| StructureSection {
                        section_id: format!("w{}s{}", wi + 1, si + 1),
                        title: section.title,
                        summary: section.summary,
                    })
                    .collect(),
            })
            .collect(),
        estimated_hours: raw.estimated_hours,
        difficulty_level: raw.difficulty_level,
        source_books: raw.source_books,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::inflight::NoopInflight;
    use crate::cache::store::MemoryCacheStore;
    use crate::llm_client::LlmError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted replies and counts calls.
    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedLlm {
        async fn generate(
            &self,
            _system: &str,
            _prompt: &str,
            _tier: Tier,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::EmptyContent)
        }
    }

    const GOOD_OUTLINE: &str = r#"{
        "weeks": [
            {
                "title": "Pricing Under No-Arbitrage",
                "sections": [
                    {"title": "Black-Scholes Formula Derivation", "summary": "derive it"},
                    {"title": "Risk-Neutral Valuation in Discrete Time", "summary": "binomial trees"}
                ]
            }
        ],
        "estimated_hours": 10,
        "difficulty_level": "intermediate",
        "source_books": ["Options, Futures, and Other Derivatives"]
    }"#;

    const NO_WEEKS: &str = r#"{
        "weeks": [],
        "estimated_hours": 0,
        "difficulty_level": "intermediate",
        "source_books": []
    }"#;

    const GENERIC_TITLE: &str = r#"{
        "weeks": [
            {
                "title": "Week One",
                "sections": [{"title": "Introduction to Options", "summary": "x"}]
            }
        ],
        "estimated_hours": 5,
        "difficulty_level": "introductory",
        "source_books": []
    }"#;

    fn cache(llm: Arc<ScriptedLlm>) -> TopicStructureCache {
        TopicStructureCache::new(
            Arc::new(MemoryCacheStore::new()),
            llm,
            Arc::new(NoopInflight),
            Arc::new(
                RoleTemplates::from_json_str(r#"["quantitative_researcher"]"#).unwrap(),
            ),
        )
    }

    fn grounding() -> Vec<ChunkRef> {
        vec![ChunkRef {
            text: "The Black-Scholes formula prices European options...".to_string(),
            score: 0.8,
            chapter: Some("Ch. 15".to_string()),
        }]
    }

    #[tokio::test]
    async fn test_miss_then_hit_idempotence() {
        let llm = Arc::new(ScriptedLlm::new(&[GOOD_OUTLINE]));
        let cache = cache(llm.clone());

        let first = cache
            .get_or_generate("other", "options pricing", &["greeks".to_string()], &grounding())
            .await
            .unwrap();
        assert!(!first.cached);
        assert_eq!(first.access_count, 1);

        let second = cache
            .get_or_generate("other", "options pricing", &["greeks".to_string()], &grounding())
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.access_count, 2);
        // one paid call total, byte-identical structural content
        assert_eq!(llm.call_count(), 1);
        assert_eq!(
            serde_json::to_string(&first.structure).unwrap(),
            serde_json::to_string(&second.structure).unwrap()
        );
    }

    #[tokio::test]
    async fn test_template_roles_share_entries_across_keyword_sets() {
        let llm = Arc::new(ScriptedLlm::new(&[GOOD_OUTLINE]));
        let cache = cache(llm.clone());

        let first = cache
            .get_or_generate(
                "quantitative_researcher",
                "options pricing",
                &["greeks".to_string()],
                &grounding(),
            )
            .await
            .unwrap();
        let second = cache
            .get_or_generate(
                "quantitative_researcher",
                "options pricing",
                &["volatility surface".to_string()],
                &grounding(),
            )
            .await
            .unwrap();
        assert!(!first.cached);
        assert!(second.cached, "template-keyed users must share one entry");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_outline_retries_once_then_succeeds() {
        let llm = Arc::new(ScriptedLlm::new(&[NO_WEEKS, GOOD_OUTLINE]));
        let cache = cache(llm.clone());

        let entry = cache
            .get_or_generate("other", "options pricing", &[], &grounding())
            .await
            .unwrap();
        assert_eq!(llm.call_count(), 2);
        assert_eq!(entry.structure.weeks.len(), 1);
    }

    #[tokio::test]
    async fn test_two_invalid_outlines_surface_failure() {
        let llm = Arc::new(ScriptedLlm::new(&[NO_WEEKS, NO_WEEKS]));
        let cache = cache(llm);

        let err = cache
            .get_or_generate("other", "options pricing", &[], &grounding())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Engine(EngineError::StructureGenerationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_generic_section_titles_are_rejected() {
        let llm = Arc::new(ScriptedLlm::new(&[GENERIC_TITLE, GENERIC_TITLE]));
        let cache = cache(llm);

        let err = cache
            .get_or_generate("other", "options pricing", &[], &grounding())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Engine(EngineError::StructureGenerationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_section_ids_are_engine_assigned() {
        let llm = Arc::new(ScriptedLlm::new(&[GOOD_OUTLINE]));
        let cache = cache(llm);

        let entry = cache
            .get_or_generate("other", "options pricing", &[], &grounding())
            .await
            .unwrap();
        let week = &entry.structure.weeks[0];
        assert_eq!(week.week_number, 1);
        assert_eq!(week.sections[0].section_id, "w1s1");
        assert_eq!(week.sections[1].section_id, "w1s2");
    }
}
