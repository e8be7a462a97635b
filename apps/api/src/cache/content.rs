//! Section Content Cache — leaf-level, user-visible study material.
//!
//! This is the only consumer of the premium generative tier; outlines and
//! extraction never need that quality level, which is why the two caches
//! sit on different tiers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::inflight::{
    wait_for_entry, Acquisition, Inflight, INFLIGHT_TTL_SECS, POLL_INTERVAL,
};
use crate::cache::keys::section_key;
use crate::cache::prompts::{CONTENT_PROMPT_TEMPLATE, CONTENT_SYSTEM};
use crate::cache::store::{CacheRecord, CacheStore, CacheTable};
use crate::cache::{build_context_block, CONTENT_VERSION};
use crate::config::RoleTemplates;
use crate::coverage::resolver::ChunkRef;
use crate::errors::{AppError, EngineError};
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, SPECIFICITY_INSTRUCTION};
use crate::llm_client::{generate_json, GenerativeClient, Tier, CONTENT_MODEL};

/// One retry on malformed output, then the failure surfaces.
const MAX_GENERATION_RETRIES: u32 = 1;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSection {
    pub title: String,
    pub body: String,
    pub key_formula: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeProblem {
    pub question: String,
    /// "easy" | "medium" | "hard"
    pub difficulty: String,
    pub answer_outline: String,
}

/// The cached long-form payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionContent {
    pub introduction: String,
    pub sections: Vec<ContentSection>,
    pub key_takeaways: Vec<String>,
    pub practical_tips: Vec<String>,
    pub practice_problems: Vec<PracticeProblem>,
    pub source_attributions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionContentEntry {
    pub cache_key: String,
    pub content: SectionContent,
    pub generation_model: String,
    pub content_version: i32,
    pub access_count: i64,
    pub cached: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Cache
// ────────────────────────────────────────────────────────────────────────────

/// Content-addressed cache in front of premium-tier section generation.
pub struct SectionContentCache {
    store: Arc<dyn CacheStore>,
    llm: Arc<dyn GenerativeClient>,
    inflight: Arc<dyn Inflight>,
    templates: Arc<RoleTemplates>,
}

impl SectionContentCache {
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

    /// Returns the cached content for (role, topic, section), generating it
    /// on first miss from the supplied grounding chunks.
    pub async fn get_or_generate(
        &self,
        role_type: &str,
        topic_name: &str,
        section_id: &str,
        section_title: &str,
        grounding: &[ChunkRef],
    ) -> Result<SectionContentEntry, AppError> {
        let key = section_key(&self.templates, role_type, topic_name, section_id, section_title);

        if let Some(entry) = self.read_hit(&key).await? {
            return Ok(entry);
        }

        if self.inflight.acquire(&key).await == Acquisition::Busy {
            info!("Waiting on in-flight content generation for '{topic_name}/{section_id}'");
            let landed = wait_for_entry(
                self.store.as_ref(),
                CacheTable::SectionContent,
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
            section_id.to_string(),
            section_title.to_string(),
            grounding.to_vec(),
        ));
        task.await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Generation task panicked: {e}")))?
    }

    async fn read_hit(&self, key: &str) -> Result<Option<SectionContentEntry>, AppError> {
        let Some(record) = self
            .store
            .fetch_and_touch(CacheTable::SectionContent, key)
            .await?
        else {
            return Ok(None);
        };
        match serde_json::from_value::<SectionContent>(record.payload.clone()) {
            Ok(content) => Ok(Some(SectionContentEntry {
                cache_key: record.cache_key,
                content,
                generation_model: record.generation_model,
                content_version: record.content_version,
                access_count: record.access_count,
                cached: true,
            })),
            Err(e) => {
                warn!("Cached content under '{key}' is unreadable ({e}) — regenerating");
                Ok(None)
            }
        }
    }
}

/// Generates, persists, and resolves write races. Runs detached from the
/// request so client disconnects never waste a paid generation.
#[allow(clippy::too_many_arguments)]
async fn finish_generation(
    store: Arc<dyn CacheStore>,
    llm: Arc<dyn GenerativeClient>,
    inflight: Arc<dyn Inflight>,
    key: String,
    topic_name: String,
    section_id: String,
    section_title: String,
    grounding: Vec<ChunkRef>,
) -> Result<SectionContentEntry, AppError> {
    let generated = generate(llm.as_ref(), &topic_name, &section_id, &section_title, &grounding).await;
    inflight.release(&key).await;
    let content = generated?;

    let payload = serde_json::to_value(&content)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize content: {e}")))?;
    let record = CacheRecord {
        cache_key: key.clone(),
        payload,
        generation_model: CONTENT_MODEL.to_string(),
        content_version: CONTENT_VERSION,
        access_count: 1,
    };

    if store
        .insert_if_absent(CacheTable::SectionContent, &record)
        .await?
    {
        info!("Cached new content for '{topic_name}/{section_id}' under {key}");
        return Ok(SectionContentEntry {
            cache_key: key,
            content,
            generation_model: record.generation_model,
            content_version: record.content_version,
            access_count: 1,
            cached: false,
        });
    }

    // Lost the write race: first writer wins, re-read the winning entry.
    match store.fetch_and_touch(CacheTable::SectionContent, &key).await? {
        Some(winner) => match serde_json::from_value::<SectionContent>(winner.payload.clone()) {
            Ok(winning_content) => Ok(SectionContentEntry {
                cache_key: winner.cache_key,
                content: winning_content,
                generation_model: winner.generation_model,
                content_version: winner.content_version,
                access_count: winner.access_count,
                cached: false,
            }),
            Err(e) => {
                warn!("Winning entry for '{key}' is unreadable ({e}) — serving own result uncached");
                Ok(SectionContentEntry {
                    cache_key: key,
                    content,
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

/// One premium-tier call, retried once on malformed or invalid output.
async fn generate(
    llm: &dyn GenerativeClient,
    topic_name: &str,
    section_id: &str,
    section_title: &str,
    grounding: &[ChunkRef],
) -> Result<SectionContent, AppError> {
    let prompt = CONTENT_PROMPT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{specificity_instruction}", SPECIFICITY_INSTRUCTION)
        .replace("{topic_name}", topic_name)
        .replace("{section_title}", section_title)
        .replace("{grounding}", &build_context_block(grounding));

    let mut last_reason = String::new();

    for attempt in 0..=MAX_GENERATION_RETRIES {
        match generate_json::<SectionContent>(llm, CONTENT_SYSTEM, &prompt, Tier::Content).await {
            Ok(content) => match validate_content(&content) {
                Ok(()) => return Ok(content),
                Err(reason) => {
                    warn!(
                        "Content for '{}/{}' invalid on attempt {}/{}: {}",
                        topic_name,
                        section_id,
                        attempt + 1,
                        MAX_GENERATION_RETRIES + 1,
                        reason
                    );
                    last_reason = reason;
                }
            },
            Err(e) => {
                warn!(
                    "Content call for '{}/{}' failed on attempt {}/{}: {}",
                    topic_name,
                    section_id,
                    attempt + 1,
                    MAX_GENERATION_RETRIES + 1,
                    e
                );
                last_reason = e.to_string();
            }
        }
    }

    Err(EngineError::ContentGenerationFailed {
        topic: topic_name.to_string(),
        section_id: section_id.to_string(),
        reason: last_reason,
    }
    .into())
}

/// Malformed content is never cached: a real introduction, at least one
/// titled section with body text, and graded practice problems.
fn validate_content(content: &SectionContent) -> Result<(), String> {
    if content.introduction.trim().is_empty() {
        return Err("introduction is empty".to_string());
    }
    if content.sections.is_empty() {
        return Err("content has no sections".to_string());
    }
    for section in &content.sections {
        if section.title.trim().is_empty() {
            return Err("a section is missing a title".to_string());
        }
        if section.body.trim().is_empty() {
            return Err(format!("section '{}' has no body", section.title));
        }
    }
    for problem in &content.practice_problems {
        if !matches!(problem.difficulty.as_str(), "easy" | "medium" | "hard") {
            return Err(format!(
                "practice problem has ungraded difficulty '{}'",
                problem.difficulty
            ));
        }
    }
    Ok(())
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

    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        calls: AtomicUsize,
        tiers: Mutex<Vec<Tier>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: AtomicUsize::new(0),
                tiers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedLlm {
        async fn generate(
            &self,
            _system: &str,
            _prompt: &str,
            tier: Tier,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tiers.lock().unwrap().push(tier);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::EmptyContent)
        }
    }

    const GOOD_CONTENT: &str = r#"{
        "introduction": "Delta hedging is the first risk-management tool an options desk reaches for.",
        "sections": [
            {
                "title": "Deriving the Hedge Ratio",
                "body": "Under Black-Scholes assumptions the hedge ratio follows from...",
                "key_formula": "delta = N(d1)"
            },
            {
                "title": "Rebalancing Costs in Practice",
                "body": "Discrete rebalancing introduces gamma-driven slippage...",
                "key_formula": null
            }
        ],
        "key_takeaways": ["Delta measures first-order price sensitivity"],
        "practical_tips": ["Re-derive N(d1) by hand before interviews"],
        "practice_problems": [
            {
                "question": "Compute the delta of an at-the-money call...",
                "difficulty": "medium",
                "answer_outline": "Apply N(d1) with the given vol and expiry"
            }
        ],
        "source_attributions": ["Options, Futures, and Other Derivatives — Ch. 19"]
    }"#;

    const UNGRADED_PROBLEM: &str = r#"{
        "introduction": "Intro text.",
        "sections": [{"title": "T", "body": "B", "key_formula": null}],
        "key_takeaways": [],
        "practical_tips": [],
        "practice_problems": [
            {"question": "Q", "difficulty": "impossible", "answer_outline": "A"}
        ],
        "source_attributions": []
    }"#;

    fn cache(llm: Arc<ScriptedLlm>) -> SectionContentCache {
        SectionContentCache::new(
            Arc::new(MemoryCacheStore::new()),
            llm,
            Arc::new(NoopInflight),
            Arc::new(RoleTemplates::from_json_str(r#"["quantitative_researcher"]"#).unwrap()),
        )
    }

    fn grounding() -> Vec<ChunkRef> {
        vec![ChunkRef {
            text: "Delta is the rate of change of the option price...".to_string(),
            score: 0.85,
            chapter: Some("Ch. 19".to_string()),
        }]
    }

    #[tokio::test]
    async fn test_miss_then_hit_with_access_count() {
        let llm = Arc::new(ScriptedLlm::new(&[GOOD_CONTENT]));
        let cache = cache(llm.clone());

        let first = cache
            .get_or_generate("other", "greeks", "w1s1", "Delta and Hedging Ratios", &grounding())
            .await
            .unwrap();
        assert!(!first.cached);
        assert_eq!(first.access_count, 1);
        assert_eq!(first.generation_model, CONTENT_MODEL);

        let second = cache
            .get_or_generate("other", "greeks", "w1s1", "Delta and Hedging Ratios", &grounding())
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.access_count, 2);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_content_uses_premium_tier() {
        let llm = Arc::new(ScriptedLlm::new(&[GOOD_CONTENT]));
        let cache = cache(llm.clone());

        cache
            .get_or_generate("other", "greeks", "w1s1", "Delta", &grounding())
            .await
            .unwrap();
        assert_eq!(llm.tiers.lock().unwrap().as_slice(), &[Tier::Content]);
    }

    #[tokio::test]
    async fn test_malformed_json_retries_then_succeeds() {
        let llm = Arc::new(ScriptedLlm::new(&["not json at all", GOOD_CONTENT]));
        let cache = cache(llm.clone());

        let entry = cache
            .get_or_generate("other", "greeks", "w1s1", "Delta", &grounding())
            .await
            .unwrap();
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
        assert_eq!(entry.content.sections.len(), 2);
    }

    #[tokio::test]
    async fn test_ungraded_problems_fail_after_retry() {
        let llm = Arc::new(ScriptedLlm::new(&[UNGRADED_PROBLEM, UNGRADED_PROBLEM]));
        let cache = cache(llm);

        let err = cache
            .get_or_generate("other", "greeks", "w1s1", "Delta", &grounding())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Engine(EngineError::ContentGenerationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_different_sections_get_distinct_entries() {
        let llm = Arc::new(ScriptedLlm::new(&[GOOD_CONTENT, GOOD_CONTENT]));
        let cache = cache(llm.clone());

        let a = cache
            .get_or_generate("other", "greeks", "w1s1", "Delta", &grounding())
            .await
            .unwrap();
        let b = cache
            .get_or_generate("other", "greeks", "w1s2", "Gamma", &grounding())
            .await
            .unwrap();
        assert_ne!(a.cache_key, b.cache_key);
        assert!(!b.cached);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }
}
