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

//! Three-tier scoped env vars (C9): global / project / commit, with
//! deterministic overlay and symmetric encryption at rest.

use nexus_crypto::CryptoBox;
use nexus_storage::envvars::{EnvVarStore, Scope};
use std::collections::HashMap;

use crate::error::ReplayResult;

pub struct EnvResolver {
    store: EnvVarStore,
    crypto: CryptoBox,
}

impl EnvResolver {
    pub fn new(store: EnvVarStore, crypto: CryptoBox) -> Self {
        Self { store, crypto }
    }

    /// Atomically replaces every row in the given scope with `vars`.
    pub async fn set(
        &self,
        scope: Scope,
        repo_id: Option<i64>,
        commit_hash: Option<&str>,
        vars: &HashMap<String, String>,
    ) -> ReplayResult<()> {
        let mut entries = Vec::with_capacity(vars.len());
        for (key, value) in vars {
            let ciphertext = self
                .crypto
                .encrypt(value)
                .map_err(|e| crate::error::ReplayError::Internal(e.to_string()))?;
            entries.push((key.clone(), ciphertext));
        }
        self.store
            .set(scope, repo_id, commit_hash, &entries)
            .await
            .map_err(|e| crate::error::ReplayError::Internal(e.to_string()))
    }

    async fn get_scope(
        &self,
        scope: Scope,
        repo_id: Option<i64>,
        commit_hash: Option<&str>,
    ) -> ReplayResult<HashMap<String, String>> {
        let rows = self
            .store
            .get(scope, repo_id, commit_hash)
            .await
            .map_err(|e| crate::error::ReplayError::Internal(e.to_string()))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            // One-way migration: if decryption fails on non-empty
            // ciphertext, treat it as legacy plaintext and return verbatim.
            let value = match self.crypto.decrypt(&row.value) {
                Ok(plain) => plain,
                Err(_) if !row.value.is_empty() => row.value.clone(),
                Err(_) => String::new(),
            };
            out.insert(row.key, value);
        }
        Ok(out)
    }

    pub async fn get_global(&self) -> ReplayResult<HashMap<String, String>> {
        self.get_scope(Scope::Global, None, None).await
    }

    pub async fn get_project(&self, repo_id: i64) -> ReplayResult<HashMap<String, String>> {
        self.get_scope(Scope::Project, Some(repo_id), None).await
    }

    pub async fn get_commit(
        &self,
        repo_id: i64,
        commit_hash: &str,
    ) -> ReplayResult<HashMap<String, String>> {
        self.get_scope(Scope::Commit, Some(repo_id), Some(commit_hash))
            .await
    }

    /// Overlay global ⊂ project ⊂ commit; later scopes win on key collision.
    pub async fn get_merged(
        &self,
        repo_id: i64,
        commit_hash: &str,
    ) -> ReplayResult<HashMap<String, String>> {
        let mut merged = self.get_global().await?;
        merged.extend(self.get_project(repo_id).await?);
        merged.extend(self.get_commit(repo_id, commit_hash).await?);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn test_resolver() -> EnvResolver {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("../nexus-storage/migrations").run(&pool).await.unwrap();
        EnvResolver::new(EnvVarStore::new(pool), CryptoBox::new([3u8; 32]))
    }

    #[tokio::test]
    async fn merged_precedence_is_global_project_commit() {
        let resolver = test_resolver().await;

        resolver
            .set(
                Scope::Global,
                None,
                None,
                &HashMap::from([("A".to_string(), "1".to_string()), ("B".to_string(), "2".to_string())]),
            )
            .await
            .unwrap();
        resolver
            .set(
                Scope::Project,
                Some(7),
                None,
                &HashMap::from([("B".to_string(), "20".to_string()), ("C".to_string(), "30".to_string())]),
            )
            .await
            .unwrap();
        resolver
            .set(
                Scope::Commit,
                Some(7),
                Some("abc1234"),
                &HashMap::from([("C".to_string(), "300".to_string()), ("D".to_string(), "400".to_string())]),
            )
            .await
            .unwrap();

        let merged = resolver.get_merged(7, "abc1234").await.unwrap();
        assert_eq!(merged.get("A").unwrap(), "1");
        assert_eq!(merged.get("B").unwrap(), "20");
        assert_eq!(merged.get("C").unwrap(), "300");
        assert_eq!(merged.get("D").unwrap(), "400");
    }

    #[tokio::test]
    async fn set_then_get_round_trips_decrypted_values() {
        let resolver = test_resolver().await;
        resolver
            .set(
                Scope::Global,
                None,
                None,
                &HashMap::from([("SECRET".to_string(), "s3kr1t".to_string())]),
            )
            .await
            .unwrap();
        let got = resolver.get_global().await.unwrap();
        assert_eq!(got.get("SECRET").unwrap(), "s3kr1t");
    }
}
