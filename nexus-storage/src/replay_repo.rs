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

//! Persistence for the Replay-side `Repository` and `Commit` tables (C1).
//! The per-repo commit table is authoritative for Replay; it is rewritten
//! wholesale on resync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReplayRepository {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub is_remote: bool,
    pub remote_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommitRow {
    pub id: i64,
    pub repo_id: i64,
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    pub author: String,
    pub author_email: String,
    pub date: DateTime<Utc>,
    pub commit_number: i64,
}

/// Input shape for a freshly-synced commit, prior to `commit_number`
/// assignment. Callers pass these oldest-first; the store assigns a dense
/// 1-based sequence.
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    pub author: String,
    pub author_email: String,
    pub date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReplayRepoStore {
    pool: SqlitePool,
}

impl ReplayRepoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> StorageResult<Vec<ReplayRepository>> {
        let rows = sqlx::query_as::<_, ReplayRepository>(
            "SELECT id, name, path, is_remote, remote_url, created_at FROM replay_repositories ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: i64) -> StorageResult<ReplayRepository> {
        sqlx::query_as::<_, ReplayRepository>(
            "SELECT id, name, path, is_remote, remote_url, created_at FROM replay_repositories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("replay repository {id}")))
    }

    pub async fn get_by_path(&self, path: &str) -> StorageResult<Option<ReplayRepository>> {
        let row = sqlx::query_as::<_, ReplayRepository>(
            "SELECT id, name, path, is_remote, remote_url, created_at FROM replay_repositories WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn add(
        &self,
        name: &str,
        path: &str,
        is_remote: bool,
        remote_url: Option<&str>,
    ) -> StorageResult<ReplayRepository> {
        if self.get_by_path(path).await?.is_some() {
            return Err(StorageError::Conflict(format!(
                "workspace path already registered: {path}"
            )));
        }
        let id = sqlx::query(
            "INSERT INTO replay_repositories (name, path, is_remote, remote_url, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(path)
        .bind(is_remote)
        .bind(remote_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        self.get(id).await
    }

    pub async fn remove(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM replay_repositories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("replay repository {id}")));
        }
        Ok(())
    }

    /// Rewrite the full commit table for `repo_id`. `commits` must be
    /// ordered oldest-first; `commit_number` is assigned densely from 1.
    pub async fn replace_commits(&self, repo_id: i64, commits: &[NewCommit]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM commits WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&mut *tx)
            .await?;

        for (index, commit) in commits.iter().enumerate() {
            sqlx::query(
                "INSERT INTO commits (repo_id, hash, short_hash, message, author, author_email, date, commit_number)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(repo_id)
            .bind(&commit.hash)
            .bind(&commit.short_hash)
            .bind(&commit.message)
            .bind(&commit.author)
            .bind(&commit.author_email)
            .bind(commit.date)
            .bind((index + 1) as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn find_by_hash(&self, repo_id: i64, hash: &str) -> StorageResult<Option<CommitRow>> {
        let row = sqlx::query_as::<_, CommitRow>(
            "SELECT id, repo_id, hash, short_hash, message, author, author_email, date, commit_number
             FROM commits WHERE repo_id = ? AND hash = ?",
        )
        .bind(repo_id)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// `page` is 1-based; ordered by `commit_number` descending.
    pub async fn paginate(
        &self,
        repo_id: i64,
        page: i64,
        page_size: i64,
    ) -> StorageResult<(Vec<CommitRow>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commits WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await?;

        let offset = (page - 1).max(0) * page_size;
        let rows = sqlx::query_as::<_, CommitRow>(
            "SELECT id, repo_id, hash, short_hash, message, author, author_email, date, commit_number
             FROM commits WHERE repo_id = ? ORDER BY commit_number DESC LIMIT ? OFFSET ?",
        )
        .bind(repo_id)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
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

    fn commit(hash: &str) -> NewCommit {
        NewCommit {
            hash: hash.into(),
            short_hash: hash[..7].into(),
            message: "msg".into(),
            author: "author".into(),
            author_email: "a@example.com".into(),
            date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replace_commits_assigns_dense_ascending_numbers() {
        let store = ReplayRepoStore::new(test_pool().await);
        let repo = store.add("demo", "/tmp/demo", false, None).await.unwrap();
        let commits = vec![
            commit("1111111aaaa"),
            commit("2222222bbbb"),
            commit("3333333cccc"),
        ];
        store.replace_commits(repo.id, &commits).await.unwrap();

        let (page, total) = store.paginate(repo.id, 1, 50).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page[0].hash, "3333333cccc");
        assert_eq!(page[0].commit_number, 3);
        assert_eq!(page[2].commit_number, 1);
    }

    #[tokio::test]
    async fn duplicate_path_rejected() {
        let store = ReplayRepoStore::new(test_pool().await);
        store.add("demo", "/tmp/demo", false, None).await.unwrap();
        let err = store.add("demo2", "/tmp/demo", false, None).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }
}
