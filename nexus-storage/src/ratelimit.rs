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

//! The rate-limit tracker (C5): a single-row snapshot of GitHub quota with
//! the non-downgrade rule as its sole cross-request ordering invariant.

use chrono::{DateTime, Utc};
use nexus_core::TokenSource;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::StorageResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitObservation {
    pub limit: i64,
    pub remaining: i64,
    pub reset_time_unix: i64,
    pub source: TokenSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiStatus {
    pub limit: i64,
    pub remaining: i64,
    pub reset_time_unix: i64,
    pub token_source: TokenSource,
    pub last_updated: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ApiStatusRow {
    #[sqlx(rename = "limit")]
    limit_: i64,
    remaining: i64,
    reset_time_unix: i64,
    token_source: String,
    last_updated: DateTime<Utc>,
}

impl TryFrom<ApiStatusRow> for ApiStatus {
    type Error = crate::error::StorageError;

    fn try_from(row: ApiStatusRow) -> Result<Self, Self::Error> {
        Ok(ApiStatus {
            limit: row.limit_,
            remaining: row.remaining,
            reset_time_unix: row.reset_time_unix,
            token_source: TokenSource::from_str(&row.token_source)
                .unwrap_or(TokenSource::None),
            last_updated: row.last_updated,
        })
    }
}

#[derive(Clone)]
pub struct RateLimitStore {
    pool: SqlitePool,
}

fn is_authenticated_source(s: &str) -> bool {
    matches!(s, "env" | "db" | "authed")
}

impl RateLimitStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> StorageResult<Option<ApiStatus>> {
        let row = sqlx::query_as::<_, ApiStatusRow>(
            "SELECT \"limit\", remaining, reset_time_unix, token_source, last_updated FROM api_status WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(ApiStatus::try_from).transpose()
    }

    pub async fn is_stale(&self) -> StorageResult<bool> {
        match self.get().await? {
            None => Ok(true),
            Some(status) => Ok(status.reset_time_unix < Utc::now().timestamp()),
        }
    }

    /// Apply an observation under the non-downgrade rule (spec.md §4.4):
    /// an authenticated snapshot is never overwritten by an unauthenticated
    /// one with a lower limit.
    pub async fn observe(&self, obs: RateLimitObservation) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query_as::<_, ApiStatusRow>(
            "SELECT \"limit\", remaining, reset_time_unix, token_source, last_updated FROM api_status WHERE id = 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = &existing {
            let downgrade = obs.limit < row.limit_
                && is_authenticated_source(&row.token_source)
                && obs.source == TokenSource::None;
            if downgrade {
                tracing::debug!(
                    stored_limit = row.limit_,
                    observed_limit = obs.limit,
                    "dropping unauthenticated rate-limit downgrade"
                );
                tx.commit().await?;
                return Ok(());
            }
        }

        sqlx::query(
            "INSERT INTO api_status (id, \"limit\", remaining, reset_time_unix, token_source, last_updated)
             VALUES (1, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                \"limit\" = excluded.\"limit\",
                remaining = excluded.remaining,
                reset_time_unix = excluded.reset_time_unix,
                token_source = excluded.token_source,
                last_updated = excluded.last_updated",
        )
        .bind(obs.limit)
        .bind(obs.remaining)
        .bind(obs.reset_time_unix)
        .bind(obs.source.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
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
    async fn first_observation_inserts() {
        let store = RateLimitStore::new(test_pool().await);
        store
            .observe(RateLimitObservation {
                limit: 5000,
                remaining: 4800,
                reset_time_unix: 1_000_000,
                source: TokenSource::Db,
            })
            .await
            .unwrap();
        let status = store.get().await.unwrap().unwrap();
        assert_eq!(status.limit, 5000);
        assert_eq!(status.token_source, TokenSource::Db);
    }

    #[tokio::test]
    async fn authenticated_snapshot_survives_unauthenticated_probe() {
        let store = RateLimitStore::new(test_pool().await);
        store
            .observe(RateLimitObservation {
                limit: 5000,
                remaining: 4800,
                reset_time_unix: 1_000_000,
                source: TokenSource::Db,
            })
            .await
            .unwrap();

        store
            .observe(RateLimitObservation {
                limit: 60,
                remaining: 59,
                reset_time_unix: 1_000_100,
                source: TokenSource::None,
            })
            .await
            .unwrap();

        let status = store.get().await.unwrap().unwrap();
        assert_eq!(status.limit, 5000);
        assert_eq!(status.remaining, 4800);
        assert_eq!(status.token_source, TokenSource::Db);
    }

    #[tokio::test]
    async fn equal_or_higher_limit_overwrites() {
        let store = RateLimitStore::new(test_pool().await);
        store
            .observe(RateLimitObservation {
                limit: 60,
                remaining: 59,
                reset_time_unix: 1,
                source: TokenSource::None,
            })
            .await
            .unwrap();
        store
            .observe(RateLimitObservation {
                limit: 5000,
                remaining: 4999,
                reset_time_unix: 2,
                source: TokenSource::Authed,
            })
            .await
            .unwrap();
        let status = store.get().await.unwrap().unwrap();
        assert_eq!(status.limit, 5000);
    }
}
