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

//! `AppConfig` key/value store: `github_token` (ciphertext), `download_path`,
//! `theme`, `last_repo_id`. Values here are stored verbatim; encryption of
//! `github_token` happens at the call site.

use sqlx::SqlitePool;

use crate::error::StorageResult;

pub const KEY_GITHUB_TOKEN: &str = "github_token";
pub const KEY_DOWNLOAD_PATH: &str = "download_path";
pub const KEY_THEME: &str = "theme";
pub const KEY_LAST_REPO_ID: &str = "last_repo_id";
pub const KEY_SEARCH_HISTORY: &str = "search_history";

#[derive(Clone)]
pub struct AppConfigStore {
    pool: SqlitePool,
}

impl AppConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM app_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO app_config (key, value) VALUES (?, ?)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM app_config WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
