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

//! The release cache (C10): per-repo release snapshots with a single TTL
//! across the group, keyed on the newest entry's `cached_at`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::error::StorageResult;

const DEFAULT_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub id: Option<i64>,
    pub name: String,
    pub size: i64,
    pub download_url: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRelease {
    pub repo_id: i64,
    pub tag_name: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_prerelease: bool,
    pub assets: Vec<ReleaseAsset>,
    pub cached_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ReleaseRow {
    repo_id: i64,
    tag_name: String,
    name: Option<String>,
    html_url: Option<String>,
    published_at: Option<DateTime<Utc>>,
    is_prerelease: i64,
    assets: String,
    cached_at: DateTime<Utc>,
}

impl ReleaseRow {
    fn into_release(self) -> StorageResult<CachedRelease> {
        Ok(CachedRelease {
            repo_id: self.repo_id,
            tag_name: self.tag_name,
            name: self.name,
            html_url: self.html_url,
            published_at: self.published_at,
            is_prerelease: self.is_prerelease != 0,
            assets: serde_json::from_str(&self.assets)?,
            cached_at: self.cached_at,
        })
    }
}

#[derive(Clone)]
pub struct ReleaseStore {
    pool: SqlitePool,
    ttl_minutes: i64,
}

impl ReleaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }

    pub fn with_ttl_minutes(pool: SqlitePool, ttl_minutes: i64) -> Self {
        Self { pool, ttl_minutes }
    }

    pub async fn get(&self, repo_id: i64) -> StorageResult<Option<Vec<CachedRelease>>> {
        let mut batch = self.get_batch(&[repo_id]).await?;
        Ok(batch.remove(&repo_id))
    }

    /// Single read ordered by `(repo_id, published_at desc)`, grouped in
    /// memory, with the staleness rule applied per group.
    pub async fn get_batch(
        &self,
        repo_ids: &[i64],
    ) -> StorageResult<HashMap<i64, Vec<CachedRelease>>> {
        if repo_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = repo_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT repo_id, tag_name, name, html_url, published_at, is_prerelease, assets, cached_at
             FROM cached_releases WHERE repo_id IN ({placeholders})
             ORDER BY repo_id ASC, published_at DESC"
        );
        let mut query = sqlx::query_as::<_, ReleaseRow>(&sql);
        for id in repo_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut grouped: HashMap<i64, Vec<CachedRelease>> = HashMap::new();
        for row in rows {
            let release = row.into_release()?;
            grouped.entry(release.repo_id).or_default().push(release);
        }

        let now = Utc::now();
        let ttl = Duration::minutes(self.ttl_minutes);
        grouped.retain(|_, releases| {
            let newest = releases.iter().map(|r| r.cached_at).max();
            match newest {
                Some(cached_at) => now - cached_at <= ttl,
                None => false,
            }
        });

        Ok(grouped)
    }

    /// Atomically replace the release group for `repo_id`, synthesizing a
    /// source-archive asset for each of `zipball`/`tarball` appended after
    /// the real assets.
    pub async fn put(
        &self,
        repo_id: i64,
        releases: &[(
            String,
            Option<String>,
            Option<String>,
            Option<DateTime<Utc>>,
            bool,
            Vec<ReleaseAsset>,
            Option<String>,
            Option<String>,
        )],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cached_releases WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for (tag_name, name, html_url, published_at, is_prerelease, assets, zipball, tarball) in
            releases
        {
            let mut all_assets = assets.clone();
            if let Some(url) = zipball {
                all_assets.push(ReleaseAsset {
                    id: None,
                    name: format!("{tag_name}.zip"),
                    size: 0,
                    download_url: url.clone(),
                    content_type: "application/zip".into(),
                });
            }
            if let Some(url) = tarball {
                all_assets.push(ReleaseAsset {
                    id: None,
                    name: format!("{tag_name}.tar.gz"),
                    size: 0,
                    download_url: url.clone(),
                    content_type: "application/gzip".into(),
                });
            }
            let assets_text = serde_json::to_string(&all_assets)?;

            sqlx::query(
                "INSERT INTO cached_releases
                    (repo_id, tag_name, name, html_url, published_at, is_prerelease, assets, cached_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(repo_id)
            .bind(tag_name)
            .bind(name)
            .bind(html_url)
            .bind(published_at)
            .bind(*is_prerelease)
            .bind(assets_text)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn invalidate(&self, repo_id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM cached_releases WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn invalidate_all(&self) -> StorageResult<()> {
        sqlx::query("DELETE FROM cached_releases")
            .execute(&self.pool)
            .await?;
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
    async fn put_then_get_round_trips_with_synthesized_assets() {
        let store = ReleaseStore::new(test_pool().await);
        store
            .put(
                1,
                &[(
                    "v1.0.0".into(),
                    Some("First release".into()),
                    None,
                    Some(Utc::now()),
                    false,
                    vec![],
                    Some("https://api.github.com/repos/a/b/zipball/v1.0.0".into()),
                    Some("https://api.github.com/repos/a/b/tarball/v1.0.0".into()),
                )],
            )
            .await
            .unwrap();

        let releases = store.get(1).await.unwrap().unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].assets.len(), 2);
    }

    #[tokio::test]
    async fn stale_group_is_invisible() {
        let pool = test_pool().await;
        let store = ReleaseStore::with_ttl_minutes(pool.clone(), 0);
        store
            .put(
                1,
                &[(
                    "v1.0.0".into(),
                    None,
                    None,
                    Some(Utc::now()),
                    false,
                    vec![],
                    None,
                    None,
                )],
            )
            .await
            .unwrap();
        assert!(store.get(1).await.unwrap().is_none());
    }
}
