#![allow(dead_code)]

//! Durable key-value store behind both content caches.
//!
//! The engine only ever upserts and reads — no deletes except explicit
//! administrative invalidation, which lives outside this service. Reads
//! carry an `access_count` increment side effect.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

/// Which cache a record belongs to. The two keyspaces are disjoint tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTable {
    TopicStructure,
    SectionContent,
}

impl CacheTable {
    fn table_name(self) -> &'static str {
        match self {
            CacheTable::TopicStructure => "topic_structure_cache",
            CacheTable::SectionContent => "section_content_cache",
        }
    }
}

/// One durable cache row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CacheRecord {
    pub cache_key: String,
    pub payload: serde_json::Value,
    pub generation_model: String,
    pub content_version: i32,
    pub access_count: i64,
}

/// Durable cache contract. Production uses `PgCacheStore`; tests and local
/// development use `MemoryCacheStore`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Looks up a key and increments its access count atomically.
    async fn fetch_and_touch(
        &self,
        table: CacheTable,
        key: &str,
    ) -> Result<Option<CacheRecord>, sqlx::Error>;

    /// Looks up a key without the access-count side effect. Used by waiters
    /// polling for another request's in-flight generation to land.
    async fn fetch(&self, table: CacheTable, key: &str) -> Result<Option<CacheRecord>, sqlx::Error>;

    /// First-writer-wins insert. Returns false when the key already exists,
    /// in which case the caller re-reads the winning entry.
    async fn insert_if_absent(
        &self,
        table: CacheTable,
        record: &CacheRecord,
    ) -> Result<bool, sqlx::Error>;
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres implementation
// ────────────────────────────────────────────────────────────────────────────

pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn fetch_and_touch(
        &self,
        table: CacheTable,
        key: &str,
    ) -> Result<Option<CacheRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE {}
            SET access_count = access_count + 1
            WHERE cache_key = $1
            RETURNING cache_key, payload, generation_model, content_version, access_count
            "#,
            table.table_name()
        );
        sqlx::query_as::<_, CacheRecord>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    async fn fetch(&self, table: CacheTable, key: &str) -> Result<Option<CacheRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT cache_key, payload, generation_model, content_version, access_count
            FROM {}
            WHERE cache_key = $1
            "#,
            table.table_name()
        );
        sqlx::query_as::<_, CacheRecord>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    async fn insert_if_absent(
        &self,
        table: CacheTable,
        record: &CacheRecord,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO {}
                (cache_key, payload, generation_model, content_version, access_count)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cache_key) DO NOTHING
            "#,
            table.table_name()
        );
        let result = sqlx::query(&sql)
            .bind(&record.cache_key)
            .bind(&record.payload)
            .bind(&record.generation_model)
            .bind(record.content_version)
            .bind(record.access_count)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory implementation (tests, local development)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryCacheStore {
    inner: Mutex<HashMap<(CacheTable, String), CacheRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn fetch_and_touch(
        &self,
        table: CacheTable,
        key: &str,
    ) -> Result<Option<CacheRecord>, sqlx::Error> {
        let mut inner = self.inner.lock().expect("cache store lock poisoned");
        Ok(inner.get_mut(&(table, key.to_string())).map(|record| {
            record.access_count += 1;
            record.clone()
        }))
    }

    async fn fetch(&self, table: CacheTable, key: &str) -> Result<Option<CacheRecord>, sqlx::Error> {
        let inner = self.inner.lock().expect("cache store lock poisoned");
        Ok(inner.get(&(table, key.to_string())).cloned())
    }

    async fn insert_if_absent(
        &self,
        table: CacheTable,
        record: &CacheRecord,
    ) -> Result<bool, sqlx::Error> {
        let mut inner = self.inner.lock().expect("cache store lock poisoned");
        let slot = (table, record.cache_key.clone());
        if inner.contains_key(&slot) {
            return Ok(false);
        }
        inner.insert(slot, record.clone());
        Ok(true)
    }
}
