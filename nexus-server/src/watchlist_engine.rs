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

//! The watchlist update engine (C6): fans out latest-release lookups
//! across every tracked repository, then reconciles the results on the
//! single writer session (`WatchlistStore::apply_probe_results`).
//!
//! Workers never touch `WatchlistStore` directly; they only read the
//! tracked repo list up front and return pure `ProbeResult` records. This
//! keeps the persistence layer's single-writer invariant intact even
//! though the probes themselves run concurrently.

use std::sync::Arc;

use nexus_github::GithubClient;
use nexus_storage::watchlist::{ProbeResult, WatchlistStore};

pub struct WatchlistEngine {
    store: WatchlistStore,
    github: Arc<GithubClient>,
}

/// Summary returned to the caller after a full "check updates" pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckUpdatesSummary {
    pub checked: usize,
    pub updates_found: u64,
}

impl WatchlistEngine {
    pub fn new(store: WatchlistStore, github: Arc<GithubClient>) -> Self {
        Self { store, github }
    }

    /// Runs one full probe pass. `token` is the resolved GitHub credential
    /// to probe with; every worker shares it, and all outbound requests
    /// still funnel through `GithubClient`'s own five-permit semaphore.
    pub async fn check_updates(&self, token: Option<&str>) -> Result<CheckUpdatesSummary, nexus_storage::StorageError> {
        let repos = self.store.list().await?;
        let checked = repos.len();

        let probes = repos.into_iter().map(|repo| {
            let github = Arc::clone(&self.github);
            let token = token.map(str::to_string);
            async move {
                match github
                    .fetch_latest_release(&repo.owner, &repo.repo_name, token.as_deref())
                    .await
                {
                    Ok(response) => ProbeResult {
                        repo_id: repo.id,
                        new_latest_tag: Some(response.data.tag_name),
                        succeeded: true,
                    },
                    Err(nexus_github::GithubError::HttpStatus(404)) => ProbeResult {
                        repo_id: repo.id,
                        new_latest_tag: None,
                        succeeded: true,
                    },
                    Err(e) => {
                        tracing::warn!(
                            owner = %repo.owner,
                            repo = %repo.repo_name,
                            error = %e,
                            "watchlist probe failed"
                        );
                        ProbeResult {
                            repo_id: repo.id,
                            new_latest_tag: None,
                            succeeded: false,
                        }
                    }
                }
            }
        });

        let results: Vec<ProbeResult> = futures::future::join_all(probes).await;
        let updates_found = self.store.apply_probe_results(results).await?;

        Ok(CheckUpdatesSummary {
            checked,
            updates_found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("../nexus-storage/migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn check_updates_against_empty_watchlist_is_a_no_op() {
        let store = WatchlistStore::new(test_pool().await);
        let engine = WatchlistEngine::new(store, Arc::new(GithubClient::new()));
        let summary = engine.check_updates(None).await.unwrap();
        assert_eq!(summary.checked, 0);
        assert_eq!(summary.updates_found, 0);
    }
}
