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

//! Gates the coalescing cache (C4) with the inbound `refresh` query flag:
//! `get` is skipped entirely when `refresh` is set, forcing the calling
//! path through the GitHub client and back into `put`.

use nexus_storage::cache::CacheStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

const DEFAULT_TTL_MINUTES: i64 = 60;

pub struct CacheGate {
    store: CacheStore,
    ttl_minutes: i64,
}

impl CacheGate {
    pub fn new(store: CacheStore) -> Self {
        Self {
            store,
            ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }

    pub fn with_ttl_minutes(store: CacheStore, ttl_minutes: i64) -> Self {
        Self { store, ttl_minutes }
    }

    /// Runs `fetch` and caches its result, unless a fresh cache entry already
    /// exists and `refresh` is false.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        tenant: &str,
        kind: &str,
        refresh: bool,
        fetch: F,
    ) -> Result<T, nexus_github::GithubError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, nexus_github::GithubError>>,
    {
        if !refresh {
            if let Ok(Some(payload)) = self.store.get(tenant, kind, self.ttl_minutes).await {
                if let Ok(value) = serde_json::from_value::<T>(payload) {
                    return Ok(value);
                }
            }
        }

        let fresh = fetch().await?;
        if let Ok(payload) = serde_json::to_value(&fresh) {
            let _ = self.store.put(tenant, kind, &payload).await;
        }
        Ok(fresh)
    }

    /// Raw opaque read/write, for callers that carry their own typed
    /// payload handling at the call site (spec.md §9 "polymorphic cache
    /// payloads").
    pub async fn get_raw(&self, tenant: &str, kind: &str, refresh: bool) -> Option<Value> {
        if refresh {
            return None;
        }
        self.store.get(tenant, kind, self.ttl_minutes).await.ok().flatten()
    }

    pub async fn put_raw(&self, tenant: &str, kind: &str, payload: &Value) {
        let _ = self.store.put(tenant, kind, payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("../nexus-storage/migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn hit_avoids_fetch() {
        let gate = CacheGate::new(CacheStore::new(test_pool().await));
        let calls = Arc::new(AtomicU32::new(0));

        let first: String = gate
            .get_or_fetch("octocat", "profile", false, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("fresh".to_string())
                }
            })
            .await
            .unwrap();
        assert_eq!(first, "fresh");

        let second: String = gate
            .get_or_fetch("octocat", "profile", false, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("should-not-be-returned".to_string())
                }
            })
            .await
            .unwrap();

        assert_eq!(second, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_flag_forces_a_miss() {
        let gate = CacheGate::new(CacheStore::new(test_pool().await));
        gate.get_or_fetch("octocat", "profile", false, || async { Ok("v1".to_string()) })
            .await
            .unwrap();

        let refreshed: String = gate
            .get_or_fetch("octocat", "profile", true, || async { Ok("v2".to_string()) })
            .await
            .unwrap();
        assert_eq!(refreshed, "v2");
    }
}
