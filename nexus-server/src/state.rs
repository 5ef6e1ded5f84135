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

//! `AppState`: every long-lived service handed to the router, bundled
//! behind `Arc` the way `agentreplay_server::api::query::AppState` does.

use std::sync::Arc;

use nexus_crypto::CryptoBox;
use nexus_github::GithubClient;
use nexus_replay::{EnvResolver, ReplayOrchestrator};
use nexus_storage::applog::LogStore;
use nexus_storage::cache::CacheStore;
use nexus_storage::config_store::AppConfigStore;
use nexus_storage::ratelimit::RateLimitStore;
use nexus_storage::releases::ReleaseStore;
use nexus_storage::replay_repo::ReplayRepoStore;
use nexus_storage::watchlist::WatchlistStore;

use crate::cache_gate::CacheGate;
use crate::config::ServerConfig;
use crate::token_resolver::TokenResolver;
use crate::watchlist_engine::WatchlistEngine;

#[derive(Clone)]
pub struct AppState(Arc<Inner>);

pub struct Inner {
    pub config: ServerConfig,
    pub github: Arc<GithubClient>,
    pub cache: CacheGate,
    pub rate_limit: RateLimitStore,
    pub watchlist: WatchlistStore,
    pub watchlist_engine: WatchlistEngine,
    pub releases: ReleaseStore,
    pub replay_repos: ReplayRepoStore,
    pub config_store: AppConfigStore,
    pub logs: LogStore,
    pub token_resolver: TokenResolver,
    pub env_resolver: EnvResolver,
    pub orchestrator: Arc<ReplayOrchestrator>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        github: Arc<GithubClient>,
        pool: sqlx::SqlitePool,
        crypto: CryptoBox,
        orchestrator: Arc<ReplayOrchestrator>,
    ) -> Self {
        let cache_store = CacheStore::new(pool.clone());
        let watchlist_store = WatchlistStore::new(pool.clone());
        let config_store = AppConfigStore::new(pool.clone());

        let inner = Inner {
            cache: CacheGate::new(cache_store),
            rate_limit: RateLimitStore::new(pool.clone()),
            watchlist_engine: WatchlistEngine::new(watchlist_store.clone(), Arc::clone(&github)),
            watchlist: watchlist_store,
            releases: ReleaseStore::new(pool.clone()),
            replay_repos: ReplayRepoStore::new(pool.clone()),
            logs: LogStore::new(pool.clone()),
            token_resolver: TokenResolver::new(
                config_store.clone(),
                crypto.clone(),
                config.github.default_token.clone(),
            ),
            env_resolver: EnvResolver::new(nexus_storage::envvars::EnvVarStore::new(pool), crypto),
            config_store,
            config,
            github,
            orchestrator,
        };

        Self(Arc::new(inner))
    }
}

impl std::ops::Deref for AppState {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
