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

//! Nexus: a local, single-user GitHub developer command center. This crate
//! wires the cache/rate-limit tracker (C1-C5, C10), the replay subsystem
//! (C7-C9), and the watchlist engine (C6) behind an HTTP API.

pub mod api;
pub mod cache_gate;
pub mod config;
pub mod error;
pub mod logging;
pub mod security;
pub mod state;
pub mod token_resolver;
pub mod watchlist_engine;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use nexus_crypto::{CryptoBox, KeyResolver};
use nexus_github::GithubClient;
use nexus_replay::{ReplayOrchestrator, StaticHtmlAdapter};

use config::ServerConfig;
use state::AppState;

const LOG_RETENTION_DAYS: i64 = 7;
const CACHE_SWEEP_TTL_MINUTES: i64 = 60;

fn init_tracing(log_layer: logging::DbLogLayer) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nexus_server=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(log_layer)
        .init();
}

fn build_router(state: AppState) -> Router {
    let cors = if state.config.server.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/api/status", get(api::status::get_status))
        .route("/api/users/:login", get(api::discovery::fetch_user))
        .route("/api/users/:login/readme", get(api::discovery::profile_readme))
        .route("/api/search-history", get(api::discovery::search_history))
        .route(
            "/api/repos/:owner/:repo/commit-count",
            get(api::discovery::commit_count),
        )
        .route("/api/repos/:owner/:repo/readme", get(api::discovery::repo_readme))
        .route("/api/repos/:owner/:repo/commits", get(api::discovery::repo_commits))
        .route(
            "/api/repos/:owner/:repo/contributions",
            get(api::discovery::contribution_graph),
        )
        .route(
            "/api/watchlist",
            get(api::watchlist::list).post(api::watchlist::add),
        )
        .route("/api/watchlist/check-updates", post(api::watchlist::check_updates))
        .route("/api/watchlist/reorder", post(api::watchlist::reorder))
        .route(
            "/api/watchlist/:id",
            get(api::watchlist::get_one).delete(api::watchlist::remove),
        )
        .route("/api/watchlist/:id/releases", get(api::releases::list))
        .route("/api/releases/download", post(api::releases::download_asset))
        .route(
            "/api/replay/repos",
            get(api::replay::list).post(api::replay::add),
        )
        .route(
            "/api/replay/repos/:id",
            get(api::replay::get_one).delete(api::replay::remove),
        )
        .route("/api/replay/repos/:id/resync", post(api::replay::resync))
        .route("/api/replay/repos/:id/commits", get(api::replay::commits))
        .route(
            "/api/replay/repos/:id/tree/:commit_hash",
            get(api::replay::file_tree),
        )
        .route(
            "/api/replay/repos/:id/content/:commit_hash",
            get(api::replay::file_content),
        )
        .route(
            "/api/replay/servers",
            get(api::servers::list),
        )
        .route("/api/replay/servers/stop-all", post(api::servers::stop_all))
        .route("/api/replay/repos/:id/servers", post(api::servers::start))
        .route(
            "/api/replay/servers/:id",
            get(api::servers::get_one).delete(api::servers::remove),
        )
        .route("/api/replay/servers/:id/stop", post(api::servers::stop))
        .route(
            "/api/envvars/global",
            get(api::envvars::get_global).put(api::envvars::set_global),
        )
        .route(
            "/api/envvars/project/:repo_id",
            get(api::envvars::get_project).put(api::envvars::set_project),
        )
        .route(
            "/api/envvars/commit/:repo_id/:commit_hash",
            get(api::envvars::get_commit).put(api::envvars::set_commit),
        )
        .route("/api/envvars/merged/:repo_id", get(api::envvars::get_merged))
        .route(
            "/api/settings/token",
            get(api::settings::get_token).post(api::settings::set_token),
        )
        .route(
            "/api/settings/download-path",
            get(api::settings::get_download_path).put(api::settings::set_download_path),
        )
        .route(
            "/api/settings/theme",
            get(api::settings::get_theme).put(api::settings::set_theme),
        )
        .route(
            "/api/settings/last-repo",
            get(api::settings::get_last_repo).put(api::settings::set_last_repo),
        )
        .route(
            "/api/settings/watchlist/export",
            get(api::settings::export_watchlist),
        )
        .route(
            "/api/settings/watchlist/import",
            post(api::settings::import_watchlist),
        )
        .route("/healthz", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

/// Run the server to completion: initialize logging, open storage, perform
/// startup maintenance, assemble the router, serve until a shutdown signal,
/// then tear everything down in the order spec.md §5 prescribes.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;

    std::fs::create_dir_all(&config.storage.data_dir).context("creating data directory")?;
    let db_path = config.database_path();
    let pool = nexus_storage::open(&db_path).await.context("opening storage")?;

    std::fs::create_dir_all(&config.server.workspaces_root)
        .context("creating workspaces root")?;

    let cache_store = nexus_storage::cache::CacheStore::new(pool.clone());
    cache_store
        .sweep(CACHE_SWEEP_TTL_MINUTES)
        .await
        .context("sweeping expired cache entries")?;

    let log_store = nexus_storage::applog::LogStore::new(pool.clone());
    log_store
        .purge_older_than(LOG_RETENTION_DAYS)
        .await
        .context("purging old log rows")?;

    let (log_layer, log_drain) = logging::spawn(log_store);
    init_tracing(log_layer);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "starting nexus-server"
    );

    let key_resolver = KeyResolver::new(
        config.storage.encryption_key_env.clone(),
        config.storage.data_dir.clone(),
    );
    let key = key_resolver.resolve_or_create().context("resolving encryption key")?;
    let crypto = CryptoBox::new(key);

    let github = Arc::new(GithubClient::new());
    let orchestrator = Arc::new(ReplayOrchestrator::new(
        config.server.workspaces_root.clone(),
        config.server.replay_base_port,
        vec![Box::new(StaticHtmlAdapter)],
    ));

    let state = AppState::new(config.clone(), github, pool, crypto, Arc::clone(&orchestrator));
    let app = build_router(state);

    let addr = config.socket_addr().context("resolving bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server loop failed")?;

    tracing::info!("shutting down: draining logs, then stopping replay instances");
    log_drain.shutdown().await;
    orchestrator.stop_all().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
