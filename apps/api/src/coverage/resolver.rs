//! Coverage resolution — multi-namespace retrieval, per-source aggregation,
//! and the covered/uncovered verdict against the deployment threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::errors::EngineError;
use crate::retrieval::{RetrievedChunk, Retriever};

/// Where a source's material came from. Books are curated and preferred
/// over crawled web pages when scores tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Book,
    Web,
}

/// A retrieved passage retained for downstream generation context.
/// Keeping these on the result avoids a second retrieval round-trip when
/// the structure/content caches need grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRef {
    pub text: String,
    pub score: f32,
    pub chapter: Option<String>,
}

/// Aggregate evidence from one source (a book title or a web domain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCoverage {
    pub source_name: String,
    pub source_type: SourceType,
    /// Best chunk similarity for this source.
    pub confidence: f32,
    pub url: Option<String>,
    pub chapter: Option<String>,
    pub chunks_above_threshold: usize,
    pub chunk_refs: Vec<ChunkRef>,
}

/// The resolver's verdict for one topic. Derived, recomputed per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageResult {
    pub topic_name: String,
    pub covered: bool,
    /// Best similarity across all sources.
    pub confidence: f32,
    pub best_source: Option<SourceCoverage>,
    pub all_sources: Vec<SourceCoverage>,
}

impl CoverageResult {
    /// Flattened grounding chunks across sources, best source first.
    pub fn grounding_chunks(&self, limit: usize) -> Vec<ChunkRef> {
        self.all_sources
            .iter()
            .flat_map(|s| s.chunk_refs.iter().cloned())
            .take(limit)
            .collect()
    }
}

/// Tunables for the coverage decision, carried separately from `Config` so
/// tests can parameterize the thresholds.
#[derive(Debug, Clone)]
pub struct CoverageConfig {
    /// Covered iff the best source's confidence ≥ this value (inclusive).
    pub coverage_threshold: f32,
    pub chunk_score_threshold: f32,
    pub top_k: usize,
    pub namespaces: Vec<String>,
    pub web_namespace: String,
}

impl From<&Config> for CoverageConfig {
    fn from(config: &Config) -> Self {
        Self {
            coverage_threshold: config.coverage_threshold,
            chunk_score_threshold: config.chunk_score_threshold,
            top_k: config.retrieval_top_k,
            namespaces: config.namespaces.clone(),
            web_namespace: config.web_namespace.clone(),
        }
    }
}

/// Resolves coverage for one topic by querying every configured namespace.
///
/// Retrieval errors surface as `CoverageUnavailable` — a topic is never
/// silently marked uncovered on transient retrieval failure; the caller
/// decides retry vs fallback.
pub async fn resolve_topic(
    topic_name: &str,
    keywords: &[String],
    retriever: &dyn Retriever,
    cfg: &CoverageConfig,
) -> Result<CoverageResult, EngineError> {
    let query = build_query(topic_name, keywords);

    let chunks = retriever
        .search_all(&query, &cfg.namespaces, cfg.top_k)
        .await
        .map_err(|e| EngineError::CoverageUnavailable {
            topic: topic_name.to_string(),
            reason: e.to_string(),
        })?;

    let sources = aggregate_sources(chunks, cfg);
    let result = classify(topic_name, sources, cfg.coverage_threshold);

    info!(
        "Coverage for '{}': covered={} confidence={:.3} sources={}",
        topic_name,
        result.covered,
        result.confidence,
        result.all_sources.len()
    );
    Ok(result)
}

/// Query string is the topic name followed by its keywords.
pub fn build_query(topic_name: &str, keywords: &[String]) -> String {
    if keywords.is_empty() {
        return topic_name.to_string();
    }
    format!("{} {}", topic_name, keywords.join(" "))
}

/// Groups ranked chunks by source name and computes per-source evidence:
/// best score, count of chunks above the per-chunk floor, and retained
/// chunk refs (ranked, best first).
pub fn aggregate_sources(chunks: Vec<RetrievedChunk>, cfg: &CoverageConfig) -> Vec<SourceCoverage> {
    // BTreeMap keeps grouping order deterministic before the final sort.
    let mut by_source: BTreeMap<String, Vec<RetrievedChunk>> = BTreeMap::new();
    for chunk in chunks {
        by_source.entry(chunk.source.clone()).or_default().push(chunk);
    }

    let mut sources: Vec<SourceCoverage> = by_source
        .into_iter()
        .map(|(source_name, mut group)| {
            group.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let best = &group[0];
            let source_type = if best.namespace == cfg.web_namespace {
                SourceType::Web
            } else {
                SourceType::Book
            };
            SourceCoverage {
                source_name,
                source_type,
                confidence: best.score,
                url: best.url.clone(),
                chapter: best.chapter.clone(),
                chunks_above_threshold: group
                    .iter()
                    .filter(|c| c.score > cfg.chunk_score_threshold)
                    .count(),
                chunk_refs: group
                    .iter()
                    .map(|c| ChunkRef {
                        text: c.text.clone(),
                        score: c.score,
                        chapter: c.chapter.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    sort_sources(&mut sources);
    sources
}

/// Deterministic source ranking: confidence descending, then books before
/// web sources, then source name ascending. Required for reproducible
/// `best_source` assertions.
fn sort_sources(sources: &mut [SourceCoverage]) {
    sources.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_type.cmp(&b.source_type))
            .then_with(|| a.source_name.cmp(&b.source_name))
    });
}

/// Covered iff the single best score across all sources reaches the
/// threshold. The boundary is inclusive.
pub fn classify(
    topic_name: &str,
    sources: Vec<SourceCoverage>,
    coverage_threshold: f32,
) -> CoverageResult {
    let best = sources.first().cloned();
    let confidence = best.as_ref().map(|s| s.confidence).unwrap_or(0.0);
    CoverageResult {
        topic_name: topic_name.to_string(),
        covered: confidence >= coverage_threshold,
        confidence,
        best_source: best,
        all_sources: sources,
    }
}
