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

//! Raw ciphertext persistence for `EnvVar` rows (C1, supporting C9).
//!
//! This module never sees plaintext; encryption/decryption and the scope
//! overlay live in `nexus_replay::env_resolver`.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::StorageResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Project,
    Commit,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
            Scope::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvVarRow {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub scope: String,
    pub repository_id: Option<i64>,
    pub commit_hash: Option<String>,
}

#[derive(Clone)]
pub struct EnvVarStore {
    pool: SqlitePool,
}

impl EnvVarStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Atomically replace every row matching `(scope, repo_id?, commit_hash?)`
    /// with `entries` (key, ciphertext pairs).
    pub async fn set(
        &self,
        scope: Scope,
        repo_id: Option<i64>,
        commit_hash: Option<&str>,
        entries: &[(String, String)],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_scope(&mut tx, scope, repo_id, commit_hash).await?;

        for (key, ciphertext) in entries {
            sqlx::query(
                "INSERT INTO env_vars (key, value, scope, repository_id, commit_hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(key)
            .bind(ciphertext)
            .bind(scope.as_str())
            .bind(repo_id)
            .bind(commit_hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(
        &self,
        scope: Scope,
        repo_id: Option<i64>,
        commit_hash: Option<&str>,
    ) -> StorageResult<Vec<EnvVarRow>> {
        let rows = match (repo_id, commit_hash) {
            (None, None) => {
                sqlx::query_as::<_, EnvVarRow>(
                    "SELECT id, key, value, scope, repository_id, commit_hash FROM env_vars
                     WHERE scope = ? AND repository_id IS NULL AND commit_hash IS NULL",
                )
                .bind(scope.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            (Some(rid), None) => {
                sqlx::query_as::<_, EnvVarRow>(
                    "SELECT id, key, value, scope, repository_id, commit_hash FROM env_vars
                     WHERE scope = ? AND repository_id = ? AND commit_hash IS NULL",
                )
                .bind(scope.as_str())
                .bind(rid)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(rid), Some(hash)) => {
                sqlx::query_as::<_, EnvVarRow>(
                    "SELECT id, key, value, scope, repository_id, commit_hash FROM env_vars
                     WHERE scope = ? AND repository_id = ? AND commit_hash = ?",
                )
                .bind(scope.as_str())
                .bind(rid)
                .bind(hash)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(_)) => vec![],
        };
        Ok(rows)
    }
}

async fn delete_scope(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    scope: Scope,
    repo_id: Option<i64>,
    commit_hash: Option<&str>,
) -> StorageResult<()> {
    match (repo_id, commit_hash) {
        (None, None) => {
            sqlx::query(
                "DELETE FROM env_vars WHERE scope = ? AND repository_id IS NULL AND commit_hash IS NULL",
            )
            .bind(scope.as_str())
            .execute(&mut **tx)
            .await?;
        }
        (Some(rid), None) => {
            sqlx::query(
                "DELETE FROM env_vars WHERE scope = ? AND repository_id = ? AND commit_hash IS NULL",
            )
            .bind(scope.as_str())
            .bind(rid)
            .execute(&mut **tx)
            .await?;
        }
        (Some(rid), Some(hash)) => {
            sqlx::query(
                "DELETE FROM env_vars WHERE scope = ? AND repository_id = ? AND commit_hash = ?",
            )
            .bind(scope.as_str())
            .bind(rid)
            .bind(hash)
            .execute(&mut **tx)
            .await?;
        }
        (None, Some(_)) => {}
    }
    Ok(())
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
    async fn set_then_get_returns_exactly_those_pairs() {
        let store = EnvVarStore::new(test_pool().await);
        store
            .set(
                Scope::Global,
                None,
                None,
                &[("A".into(), "enc1".into()), ("B".into(), "enc2".into())],
            )
            .await
            .unwrap();

        let rows = store.get(Scope::Global, None, None).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn set_replaces_prior_rows_for_same_scope() {
        let store = EnvVarStore::new(test_pool().await);
        store
            .set(Scope::Global, None, None, &[("A".into(), "enc1".into())])
            .await
            .unwrap();
        store
            .set(Scope::Global, None, None, &[("B".into(), "enc2".into())])
            .await
            .unwrap();

        let rows = store.get(Scope::Global, None, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "B");
    }
}
