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

//! The `AppLog` table: a best-effort DB sink fed by the log-drain worker,
//! purged at startup alongside the cache sweep (spec.md §5).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::StorageResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub target: String,
}

#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_batch(&self, entries: &[LogEntry]) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO app_logs (level, message, target, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&entry.level)
            .bind(&entry.message)
            .bind(&entry.target)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Purge log rows older than `retention_days`. Called once at startup.
    pub async fn purge_older_than(&self, retention_days: i64) -> StorageResult<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::days(retention_days);
        let result = sqlx::query("DELETE FROM app_logs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn purge_removes_rows_older_than_retention() {
        let pool = test_pool().await;
        let store = LogStore::new(pool.clone());
        let stale = Utc::now() - Duration::days(10);
        sqlx::query("INSERT INTO app_logs (level, message, target, created_at) VALUES ('info', 'm', 't', ?)")
            .bind(stale)
            .execute(&pool)
            .await
            .unwrap();
        store
            .insert_batch(&[LogEntry {
                level: "info".into(),
                message: "fresh".into(),
                target: "nexus_server".into(),
            }])
            .await
            .unwrap();

        let removed = store.purge_older_than(7).await.unwrap();
        assert_eq!(removed, 1);
    }
}
