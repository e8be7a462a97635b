//! Vector Retrieval Client — ranked chunk search over the indexed corpus.
//!
//! The index is partitioned into namespaces (curated book content vs crawled
//! web pages) that are searched independently and merged. The merge order is
//! a deterministic sort so downstream "best source" decisions are
//! reproducible regardless of network arrival order.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Retrieval calls are bounded far tighter than generative calls.
const RETRIEVAL_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// One ranked chunk returned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Cosine similarity in [0, 1].
    pub score: f32,
    /// Namespace the chunk was found in.
    pub namespace: String,
    /// Book title or web domain.
    pub source: String,
    pub url: Option<String>,
    pub chapter: Option<String>,
}

/// The retrieval contract consumed by the Coverage Resolver. Production uses
/// `HttpRetriever`; tests substitute synthetic retrievers with fixed scores.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Searches one namespace, returning up to `top_k` chunks ranked by score.
    async fn search(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError>;

    /// Searches every namespace concurrently and merges into one ranked list.
    ///
    /// Namespaces are independent reads, so they are fetched in parallel; the
    /// merge is sorted by score descending with source name as tie-break.
    async fn search_all(
        &self,
        query: &str,
        namespaces: &[String],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let searches = namespaces.iter().map(|ns| self.search(query, ns, top_k));
        let mut merged = Vec::new();
        for result in join_all(searches).await {
            merged.extend(result?);
        }
        sort_ranked(&mut merged);
        Ok(merged)
    }
}

/// Deterministic ranking: score descending, then source name ascending.
pub fn sort_ranked(chunks: &mut [RetrievedChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source.cmp(&b.source))
    });
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    namespace: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    text: String,
    score: f32,
    metadata: MatchMetadata,
}

#[derive(Debug, Deserialize)]
struct MatchMetadata {
    source: String,
    url: Option<String>,
    chapter: Option<String>,
}

/// Retrieval client talking to the vector-search service over HTTP.
/// The service embeds the query itself; Compass never handles vectors.
#[derive(Clone)]
pub struct HttpRetriever {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpRetriever {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(RETRIEVAL_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let request = QueryRequest {
            query,
            namespace,
            top_k,
        };

        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let payload: QueryResponse = response.json().await?;
        debug!(
            "Retrieved {} chunks from namespace '{}'",
            payload.matches.len(),
            namespace
        );

        Ok(payload
            .matches
            .into_iter()
            .map(|m| RetrievedChunk {
                text: m.text,
                score: m.score,
                namespace: namespace.to_string(),
                source: m.metadata.source,
                url: m.metadata.url,
                chapter: m.metadata.chapter,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: format!("excerpt from {source}"),
            score,
            namespace: "books".to_string(),
            source: source.to_string(),
            url: None,
            chapter: None,
        }
    }

    #[test]
    fn test_sort_ranked_orders_by_score_descending() {
        let mut chunks = vec![chunk("a", 0.3), chunk("b", 0.9), chunk("c", 0.6)];
        sort_ranked(&mut chunks);
        assert_eq!(chunks[0].source, "b");
        assert_eq!(chunks[1].source, "c");
        assert_eq!(chunks[2].source, "a");
    }

    #[test]
    fn test_sort_ranked_breaks_score_ties_lexically() {
        let mut chunks = vec![chunk("zeta", 0.5), chunk("alpha", 0.5)];
        sort_ranked(&mut chunks);
        assert_eq!(chunks[0].source, "alpha");
        assert_eq!(chunks[1].source, "zeta");
    }

    struct FixedRetriever;

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(
            &self,
            _query: &str,
            namespace: &str,
            _top_k: usize,
        ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
            let score = if namespace == "books" { 0.8 } else { 0.6 };
            Ok(vec![RetrievedChunk {
                text: "x".to_string(),
                score,
                namespace: namespace.to_string(),
                source: namespace.to_string(),
                url: None,
                chapter: None,
            }])
        }
    }

    #[tokio::test]
    async fn test_search_all_merges_namespaces_ranked() {
        let namespaces = vec!["web".to_string(), "books".to_string()];
        let merged = FixedRetriever
            .search_all("value at risk", &namespaces, 5)
            .await
            .unwrap();
        assert_eq!(merged.len(), 2);
        // books scores 0.8 and must lead despite being listed second
        assert_eq!(merged[0].namespace, "books");
        assert_eq!(merged[1].namespace, "web");
    }
}
