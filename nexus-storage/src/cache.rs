// Copyright 2025 Nexus Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The coalescing cache (C4): a TTL'd key/value store indexed by
//! `(tenant_key, endpoint_kind)`.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::error::StorageResult;

#[derive(Debug, Clone, sqlx::FromRow)]
struct CacheRow {
    payload: String,
    last_updated: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the stored payload only if present and not older than
    /// `ttl_minutes`.
    pub async fn get(
        &self,
        tenant: &str,
        kind: &str,
        ttl_minutes: i64,
    ) -> StorageResult<Option<Value>> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT payload, last_updated FROM cache_entries WHERE tenant_key = ? AND endpoint_kind = ?",
        )
        .bind(tenant)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let age = Utc::now() - row.last_updated;
        if age > Duration::minutes(ttl_minutes) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&row.payload)?))
    }

    /// Upserts the payload, setting `last_updated = now(UTC)`. The write is
    /// a single atomic statement so a reader never observes a partial
    /// payload (spec.md §4.3 invariant).
    pub async fn put(&self, tenant: &str, kind: &str, payload: &Value) -> StorageResult<()> {
        let payload_text = serde_json::to_string(payload)?;
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO cache_entries (tenant_key, endpoint_kind, payload, last_updated)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (tenant_key, endpoint_kind)
             DO UPDATE SET payload = excluded.payload, last_updated = excluded.last_updated",
        )
        .bind(tenant)
        .bind(kind)
        .bind(payload_text)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes entries older than `ttl_minutes` and returns the count removed.
    pub async fn sweep(&self, ttl_minutes: i64) -> StorageResult<u64> {
        let cutoff = Utc::now() - Duration::minutes(ttl_minutes);
        let result = sqlx::query("DELETE FROM cache_entries WHERE last_updated < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn put_then_get_returns_payload_within_ttl() {
        let store = CacheStore::new(test_pool().await);
        store
            .put("octocat", "profile", &json!({"login": "octocat"}))
            .await
            .unwrap();
        let got = store.get("octocat", "profile", 60).await.unwrap();
        assert_eq!(got, Some(json!({"login": "octocat"})));
    }

    #[tokio::test]
    async fn get_misses_when_stale() {
        let pool = test_pool().await;
        let store = CacheStore::new(pool.clone());
        let stale = Utc::now() - Duration::minutes(90);
        sqlx::query(
            "INSERT INTO cache_entries (tenant_key, endpoint_kind, payload, last_updated) VALUES (?, ?, ?, ?)",
        )
        .bind("octocat")
        .bind("profile")
        .bind("{}")
        .bind(stale)
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(store.get("octocat", "profile", 60).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sweep_removes_only_entries_older_than_ttl() {
        let store = CacheStore::new(test_pool().await);
        store.put("a", "profile", &json!({})).await.unwrap();
        let removed = store.sweep(0).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get("a", "profile", 60).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_is_atomic_upsert_not_duplicate_rows() {
        let pool = test_pool().await;
        let store = CacheStore::new(pool.clone());
        store.put("a", "profile", &json!({"v": 1})).await.unwrap();
        store.put("a", "profile", &json!({"v": 2})).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
        assert_eq!(
            store.get("a", "profile", 60).await.unwrap(),
            Some(json!({"v": 2}))
        );
    }
}
