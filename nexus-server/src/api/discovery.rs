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

//! User/repo discovery: fetch-user, repo-readme, commit-count, repo-commits,
//! contribution-graph, search-history. Every read goes through the
//! coalescing cache gate (C4) and records whatever rate-limit headers came
//! back (C5), per the control-flow summary in spec.md §2.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nexus_github::RepoSort;
use nexus_storage::config_store::KEY_SEARCH_HISTORY;

use crate::api::common::{record_rate_limit, TokenAndRefresh};
use crate::error::ApiError;
use crate::state::AppState;

const SEARCH_HISTORY_LIMIT: usize = 20;

pub async fn fetch_user(
    State(state): State<AppState>,
    Path(login): Path<String>,
    Query(params): Query<TokenAndRefresh>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;
    let github = state.github.clone();
    let token = resolved.token.clone();

    let mut rate_limit = None;
    let profile = state
        .cache
        .get_or_fetch(&login, "profile", params.refresh, || {
            let github = github.clone();
            let login = login.clone();
            async move {
                let resp = github.fetch_profile(&login, token.as_deref()).await?;
                Ok(resp.data)
            }
        })
        .await;

    let profile = match profile {
        Ok(p) => p,
        Err(e) => return Err(ApiError::from(e)),
    };

    // The repo list piggybacks on the same request under its own cache kind.
    let token = resolved.token.clone();
    let repos = state
        .cache
        .get_or_fetch(&login, "repos", params.refresh, || {
            let github = github.clone();
            let login = login.clone();
            async move {
                let resp = github.fetch_user_repos(&login, token.as_deref(), RepoSort::NewestPushed).await?;
                rate_limit = resp.rate_limit;
                Ok(resp.data)
            }
        })
        .await
        .map_err(ApiError::from)?;

    record_rate_limit(&state, rate_limit).await;
    record_search_history(&state, &login).await;

    Ok(Json(json!({ "profile": profile, "repos": repos })))
}

async fn record_search_history(state: &AppState, login: &str) {
    let existing = state
        .config_store
        .get(KEY_SEARCH_HISTORY)
        .await
        .ok()
        .flatten()
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();

    let mut history: Vec<String> = existing.into_iter().filter(|l| l != login).collect();
    history.insert(0, login.to_string());
    history.truncate(SEARCH_HISTORY_LIMIT);

    if let Ok(serialized) = serde_json::to_string(&history) {
        let _ = state.config_store.set(KEY_SEARCH_HISTORY, &serialized).await;
    }
}

pub async fn search_history(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let history = state
        .config_store
        .get(KEY_SEARCH_HISTORY)
        .await
        .map_err(ApiError::from)?
        .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
        .unwrap_or_default();
    Ok(Json(history))
}

#[derive(Debug, Serialize)]
pub struct CommitCountResponse {
    pub count: u64,
}

pub async fn commit_count(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<TokenAndRefresh>,
) -> Result<Json<CommitCountResponse>, ApiError> {
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;
    let tenant = format!("{owner}/{repo}");
    let github = state.github.clone();
    let token = resolved.token.clone();
    let mut rate_limit = None;

    let count = state
        .cache
        .get_or_fetch(&tenant, "commit_count_value", params.refresh, || {
            let github = github.clone();
            let (owner, repo) = (owner.clone(), repo.clone());
            async move {
                let resp = github.fetch_commit_count(&owner, &repo, token.as_deref()).await?;
                rate_limit = resp.rate_limit;
                Ok(resp.data)
            }
        })
        .await
        .map_err(ApiError::from)?;

    record_rate_limit(&state, rate_limit).await;
    Ok(Json(CommitCountResponse { count }))
}

pub async fn repo_readme(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<TokenAndRefresh>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;
    let tenant = format!("{owner}/{repo}");
    let github = state.github.clone();
    let token = resolved.token.clone();
    let mut rate_limit = None;

    let readme = state
        .cache
        .get_or_fetch(&tenant, "repo_readme", params.refresh, || {
            let github = github.clone();
            let (owner, repo) = (owner.clone(), repo.clone());
            async move {
                let resp = github.fetch_readme(&owner, Some(&repo), token.as_deref()).await?;
                rate_limit = resp.rate_limit;
                Ok(resp.data)
            }
        })
        .await
        .map_err(ApiError::from)?;

    record_rate_limit(&state, rate_limit).await;
    Ok(Json(json!({ "readme": readme })))
}

pub async fn profile_readme(
    State(state): State<AppState>,
    Path(login): Path<String>,
    Query(params): Query<TokenAndRefresh>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;
    let github = state.github.clone();
    let token = resolved.token.clone();
    let mut rate_limit = None;

    let readme = state
        .cache
        .get_or_fetch(&login, "profile_readme", params.refresh, || {
            let github = github.clone();
            let login = login.clone();
            async move {
                let resp = github.fetch_readme(&login, None, token.as_deref()).await?;
                rate_limit = resp.rate_limit;
                Ok(resp.data)
            }
        })
        .await
        .map_err(ApiError::from)?;

    record_rate_limit(&state, rate_limit).await;
    Ok(Json(json!({ "readme": readme })))
}

#[derive(Debug, Deserialize)]
pub struct CommitsQuery {
    pub token: Option<String>,
    #[serde(default)]
    pub refresh: bool,
    pub limit: Option<u32>,
}

pub async fn repo_commits(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<CommitsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;
    let tenant = format!("{owner}/{repo}");
    let github = state.github.clone();
    let token = resolved.token.clone();
    let limit = params.limit;
    let mut rate_limit = None;

    let commits = state
        .cache
        .get_or_fetch(&tenant, "repo_history", params.refresh, || {
            let github = github.clone();
            let (owner, repo) = (owner.clone(), repo.clone());
            async move {
                let resp = github.fetch_recent_commits(&owner, &repo, token.as_deref(), limit).await?;
                rate_limit = resp.rate_limit;
                Ok(resp.data)
            }
        })
        .await
        .map_err(ApiError::from)?;

    record_rate_limit(&state, rate_limit).await;
    Ok(Json(json!({ "commits": commits })))
}

/// A thin best-effort bucketing of recent commits by UTC calendar date,
/// cached the same way every other discovery endpoint is (spec.md §1 lists
/// this surface as "out of scope" for deep engineering, but it still rides
/// the same cache gate as everything else).
pub async fn contribution_graph(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<TokenAndRefresh>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;
    let tenant = format!("{owner}/{repo}");
    let github = state.github.clone();
    let token = resolved.token.clone();
    let mut rate_limit = None;

    let histogram = state
        .cache
        .get_or_fetch(&tenant, "contribution_graph", params.refresh, || {
            let github = github.clone();
            let (owner, repo) = (owner.clone(), repo.clone());
            async move {
                let resp = github
                    .fetch_recent_commits(&owner, &repo, token.as_deref(), Some(1000))
                    .await?;
                rate_limit = resp.rate_limit;
                let mut buckets: std::collections::BTreeMap<String, u64> = std::collections::BTreeMap::new();
                for commit in &resp.data {
                    let day = commit.commit.author.date.format("%Y-%m-%d").to_string();
                    *buckets.entry(day).or_insert(0) += 1;
                }
                Ok(buckets)
            }
        })
        .await
        .map_err(ApiError::from)?;

    record_rate_limit(&state, rate_limit).await;
    Ok(Json(json!({ "days": histogram })))
}
