#![allow(dead_code)]

//! Per-key in-flight markers for cache-miss generation.
//!
//! Two concurrent requests missing the same key would otherwise both pay
//! for the same generative call. The first to acquire the Redis sentinel
//! generates; the other polls the durable store until the winner publishes
//! or the sentinel expires. Duplicate generation is wasteful but not
//! unsafe, so a Redis outage fails open.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::cache::store::{CacheStore, CacheTable};

/// Sentinel TTL — generous enough for a slow premium-tier call.
pub const INFLIGHT_TTL_SECS: u64 = 60;
/// How often a losing contender re-checks the durable store.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// This request generates.
    Acquired,
    /// Another request is already generating this key.
    Busy,
}

/// In-flight marker contract. Production uses `RedisInflight`; tests use
/// `NoopInflight`.
#[async_trait]
pub trait Inflight: Send + Sync {
    async fn acquire(&self, key: &str) -> Acquisition;
    async fn release(&self, key: &str);
}

// ────────────────────────────────────────────────────────────────────────────
// Redis implementation
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisInflight {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisInflight {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    async fn try_acquire(&self, key: &str) -> Result<Acquisition, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(sentinel_key(key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(match reply {
            Some(_) => Acquisition::Acquired,
            None => Acquisition::Busy,
        })
    }
}

#[async_trait]
impl Inflight for RedisInflight {
    async fn acquire(&self, key: &str) -> Acquisition {
        match self.try_acquire(key).await {
            Ok(acquisition) => acquisition,
            Err(e) => {
                // Fail open: a duplicate paid call beats a stalled request.
                warn!("In-flight marker unavailable ({e}) — proceeding to generate");
                Acquisition::Acquired
            }
        }
    }

    async fn release(&self, key: &str) {
        let result: Result<(), redis::RedisError> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            redis::cmd("DEL")
                .arg(sentinel_key(key))
                .query_async(&mut conn)
                .await
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to release in-flight marker for '{key}': {e}");
        }
    }
}

fn sentinel_key(key: &str) -> String {
    format!("inflight:{key}")
}

/// Always-acquire marker for tests and single-process local runs.
pub struct NoopInflight;

#[async_trait]
impl Inflight for NoopInflight {
    async fn acquire(&self, _key: &str) -> Acquisition {
        Acquisition::Acquired
    }

    async fn release(&self, _key: &str) {}
}

/// Polls the durable store until the key appears or the deadline passes.
/// Returns whether the entry landed.
pub async fn wait_for_entry(
    store: &dyn CacheStore,
    table: CacheTable,
    key: &str,
    deadline: Duration,
    interval: Duration,
) -> Result<bool, sqlx::Error> {
    let started = tokio::time::Instant::now();
    loop {
        if store.fetch(table, key).await?.is_some() {
            return Ok(true);
        }
        if started.elapsed() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{CacheRecord, MemoryCacheStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_wait_for_entry_sees_published_record() {
        let store = MemoryCacheStore::new();
        store
            .insert_if_absent(
                CacheTable::TopicStructure,
                &CacheRecord {
                    cache_key: "k".to_string(),
                    payload: json!({}),
                    generation_model: "m".to_string(),
                    content_version: 1,
                    access_count: 1,
                },
            )
            .await
            .unwrap();
        let found = wait_for_entry(
            &store,
            CacheTable::TopicStructure,
            "k",
            Duration::from_millis(50),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert!(found);
    }

    #[tokio::test]
    async fn test_wait_for_entry_times_out_on_absent_key() {
        let store = MemoryCacheStore::new();
        let found = wait_for_entry(
            &store,
            CacheTable::TopicStructure,
            "missing",
            Duration::from_millis(20),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn test_noop_inflight_always_acquires() {
        assert_eq!(NoopInflight.acquire("k").await, Acquisition::Acquired);
    }
}
