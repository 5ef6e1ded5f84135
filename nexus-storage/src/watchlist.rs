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

//! Persistence for `TrackedRepo` rows, backing the watchlist update engine
//! (C6) and its CRUD/reorder surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};

pub const NOT_CHECKED: &str = "Not Checked";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackedRepo {
    pub id: i64,
    pub owner: String,
    pub repo_name: String,
    pub current_version: String,
    pub latest_version: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub sort_order: i64,
}

/// A pure, side-effect-free result of probing one repo's latest release.
/// Produced by watchlist-engine workers; applied by the single writer.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub repo_id: i64,
    pub new_latest_tag: Option<String>,
    pub succeeded: bool,
}

#[derive(Clone)]
pub struct WatchlistStore {
    pool: SqlitePool,
}

impl WatchlistStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> StorageResult<Vec<TrackedRepo>> {
        let rows = sqlx::query_as::<_, TrackedRepo>(
            "SELECT id, owner, repo_name, current_version, latest_version, description,
                    avatar_url, html_url, last_checked, sort_order
             FROM tracked_repos ORDER BY sort_order ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> StorageResult<TrackedRepo> {
        sqlx::query_as::<_, TrackedRepo>(
            "SELECT id, owner, repo_name, current_version, latest_version, description,
                    avatar_url, html_url, last_checked, sort_order
             FROM tracked_repos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("tracked repo {id}")))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add(
        &self,
        owner: &str,
        repo_name: &str,
        description: Option<&str>,
        avatar_url: Option<&str>,
        html_url: Option<&str>,
    ) -> StorageResult<TrackedRepo> {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tracked_repos WHERE owner = ? AND repo_name = ?",
        )
        .bind(owner)
        .bind(repo_name)
        .fetch_one(&self.pool)
        .await?;
        if existing > 0 {
            return Err(StorageError::Conflict(format!(
                "{owner}/{repo_name} is already tracked"
            )));
        }

        let next_sort: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sort_order) + 1, 0) FROM tracked_repos")
                .fetch_one(&self.pool)
                .await?;

        let id = sqlx::query(
            "INSERT INTO tracked_repos (owner, repo_name, current_version, description, avatar_url, html_url, sort_order)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(owner)
        .bind(repo_name)
        .bind(NOT_CHECKED)
        .bind(description)
        .bind(avatar_url)
        .bind(html_url)
        .bind(next_sort)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get(id).await
    }

    /// Overwrite `current_version` directly, bypassing the probe-result
    /// reconciliation path. Used by watchlist import, where the caller
    /// supplies an already-known version rather than a freshly probed tag.
    pub async fn set_current_version(&self, id: i64, current_version: &str) -> StorageResult<()> {
        let result = sqlx::query("UPDATE tracked_repos SET current_version = ? WHERE id = ?")
            .bind(current_version)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("tracked repo {id}")));
        }
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM tracked_repos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("tracked repo {id}")));
        }
        Ok(())
    }

    /// Persist a new explicit ordering. `ordered_ids` lists every tracked
    /// repo id in its desired display order.
    pub async fn reorder(&self, ordered_ids: &[i64]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for (index, id) in ordered_ids.iter().enumerate() {
            sqlx::query("UPDATE tracked_repos SET sort_order = ? WHERE id = ?")
                .bind(index as i64)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Apply every worker's probe result on the single writer session, in
    /// deterministic `repo_id` order. Returns the number of repos whose
    /// `latest_version` changed.
    pub async fn apply_probe_results(&self, mut results: Vec<ProbeResult>) -> StorageResult<u64> {
        results.sort_by_key(|r| r.repo_id);
        let mut updates_found = 0u64;
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for result in results {
            if !result.succeeded {
                continue;
            }
            let current: (String, Option<String>) = sqlx::query_as(
                "SELECT current_version, latest_version FROM tracked_repos WHERE id = ?",
            )
            .bind(result.repo_id)
            .fetch_one(&mut *tx)
            .await?;

            if let Some(new_tag) = &result.new_latest_tag {
                if current.1.as_deref() != Some(new_tag.as_str()) {
                    sqlx::query("UPDATE tracked_repos SET latest_version = ? WHERE id = ?")
                        .bind(new_tag)
                        .bind(result.repo_id)
                        .execute(&mut *tx)
                        .await?;
                    updates_found += 1;
                }
                if current.0 == NOT_CHECKED {
                    sqlx::query("UPDATE tracked_repos SET current_version = ? WHERE id = ?")
                        .bind(new_tag)
                        .bind(result.repo_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }

            sqlx::query("UPDATE tracked_repos SET last_checked = ? WHERE id = ?")
                .bind(now)
                .bind(result.repo_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(updates_found)
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
    async fn add_rejects_duplicate_owner_repo() {
        let store = WatchlistStore::new(test_pool().await);
        store.add("rust-lang", "rust", None, None, None).await.unwrap();
        let err = store
            .add("rust-lang", "rust", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn new_repo_starts_not_checked() {
        let store = WatchlistStore::new(test_pool().await);
        let repo = store.add("rust-lang", "rust", None, None, None).await.unwrap();
        assert_eq!(repo.current_version, NOT_CHECKED);
    }

    #[tokio::test]
    async fn set_current_version_overwrites_directly() {
        let store = WatchlistStore::new(test_pool().await);
        let repo = store.add("rust-lang", "rust", None, None, None).await.unwrap();
        store.set_current_version(repo.id, "1.80.0").await.unwrap();
        let updated = store.get(repo.id).await.unwrap();
        assert_eq!(updated.current_version, "1.80.0");
    }

    #[tokio::test]
    async fn probe_result_promotes_current_version_once() {
        let store = WatchlistStore::new(test_pool().await);
        let repo = store.add("rust-lang", "rust", None, None, None).await.unwrap();

        store
            .apply_probe_results(vec![ProbeResult {
                repo_id: repo.id,
                new_latest_tag: Some("1.80.0".into()),
                succeeded: true,
            }])
            .await
            .unwrap();

        let updated = store.get(repo.id).await.unwrap();
        assert_eq!(updated.current_version, "1.80.0");
        assert_eq!(updated.latest_version.as_deref(), Some("1.80.0"));
        assert!(updated.last_checked.is_some());

        store
            .apply_probe_results(vec![ProbeResult {
                repo_id: repo.id,
                new_latest_tag: Some("1.81.0".into()),
                succeeded: true,
            }])
            .await
            .unwrap();
        let updated2 = store.get(repo.id).await.unwrap();
        assert_eq!(updated2.current_version, "1.80.0");
        assert_eq!(updated2.latest_version.as_deref(), Some("1.81.0"));
    }

    #[tokio::test]
    async fn reorder_persists_sort_order() {
        let store = WatchlistStore::new(test_pool().await);
        let a = store.add("a", "a", None, None, None).await.unwrap();
        let b = store.add("b", "b", None, None, None).await.unwrap();
        store.reorder(&[b.id, a.id]).await.unwrap();
        let list = store.list().await.unwrap();
        assert_eq!(list[0].id, b.id);
        assert_eq!(list[1].id, a.id);
    }
}
