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

//! Replay repository registration, commit resync and pagination, and
//! read-only file-tree/content browsing of a materialized commit (C7).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use nexus_replay::worktree::{FileTreeEntry, WorktreeManager};
use nexus_storage::replay_repo::{CommitRow, NewCommit, ReplayRepository};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ReplayRepository>>, ApiError> {
    Ok(Json(state.replay_repos.list().await.map_err(ApiError::from)?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReplayRepository>, ApiError> {
    Ok(Json(state.replay_repos.get(id).await.map_err(ApiError::from)?))
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub is_remote: bool,
    pub remote_url: Option<String>,
}

pub async fn add(
    State(state): State<AppState>,
    Json(body): Json<AddRequest>,
) -> Result<Json<ReplayRepository>, ApiError> {
    let path = std::path::PathBuf::from(&body.path);
    if !WorktreeManager::is_valid_repo(&path) {
        return Err(ApiError::BadInput(format!("not a git repository: {}", body.path)));
    }

    let repo = state
        .replay_repos
        .add(&body.name, &body.path, body.is_remote, body.remote_url.as_deref())
        .await
        .map_err(ApiError::from)?;

    resync_commits(&state, &repo).await?;
    Ok(Json(repo))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> Result<(), ApiError> {
    state.replay_repos.remove(id).await.map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
pub struct ResyncQuery {
    pub branch: Option<String>,
}

pub async fn resync(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<ResyncQuery>,
) -> Result<(), ApiError> {
    let repo = state.replay_repos.get(id).await.map_err(ApiError::from)?;
    let path = repo.path.clone();
    let branch = params.branch.clone();
    let commits = tokio::task::spawn_blocking(move || {
        WorktreeManager::get_commits(std::path::Path::new(&path), None, branch.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(ApiError::from)?;

    let mut oldest_first: Vec<NewCommit> = commits
        .into_iter()
        .rev()
        .map(|c| NewCommit {
            hash: c.hash,
            short_hash: c.short_hash,
            message: c.message,
            author: c.author,
            author_email: c.author_email,
            date: c.date,
        })
        .collect();
    oldest_first.shrink_to_fit();

    state
        .replay_repos
        .replace_commits(repo.id, &oldest_first)
        .await
        .map_err(ApiError::from)
}

async fn resync_commits(state: &AppState, repo: &ReplayRepository) -> Result<(), ApiError> {
    let path = repo.path.clone();
    let commits = tokio::task::spawn_blocking(move || {
        WorktreeManager::get_commits(std::path::Path::new(&path), None, None)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(ApiError::from)?;

    let oldest_first: Vec<NewCommit> = commits
        .into_iter()
        .rev()
        .map(|c| NewCommit {
            hash: c.hash,
            short_hash: c.short_hash,
            message: c.message,
            author: c.author,
            author_email: c.author_email,
            date: c.date,
        })
        .collect();

    state
        .replay_repos
        .replace_commits(repo.id, &oldest_first)
        .await
        .map_err(ApiError::from)
}

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CommitsPageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CommitsPage {
    pub commits: Vec<CommitRow>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub has_more: bool,
}

pub async fn commits(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<CommitsPageQuery>,
) -> Result<Json<CommitsPage>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let (rows, total) = state
        .replay_repos
        .paginate(id, page, page_size)
        .await
        .map_err(ApiError::from)?;

    let has_more = page * page_size < total;
    Ok(Json(CommitsPage {
        commits: rows,
        total,
        page,
        page_size,
        has_more,
    }))
}

pub async fn file_tree(
    State(state): State<AppState>,
    Path((id, commit_hash)): Path<(i64, String)>,
) -> Result<Json<Vec<FileTreeEntry>>, ApiError> {
    let repo = state.replay_repos.get(id).await.map_err(ApiError::from)?;
    let path = repo.path.clone();
    let tree = tokio::task::spawn_blocking(move || {
        WorktreeManager::get_file_tree(std::path::Path::new(&path), &commit_hash)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(ApiError::from)?;
    Ok(Json(tree))
}

#[derive(Debug, Deserialize)]
pub struct FileContentQuery {
    pub path: String,
}

pub async fn file_content(
    State(state): State<AppState>,
    Path((id, commit_hash)): Path<(i64, String)>,
    Query(params): Query<FileContentQuery>,
) -> Result<String, ApiError> {
    let repo = state.replay_repos.get(id).await.map_err(ApiError::from)?;
    let repo_path = repo.path.clone();
    let file_path = params.path.clone();
    let content = tokio::task::spawn_blocking(move || {
        WorktreeManager::get_file_content(std::path::Path::new(&repo_path), &commit_hash, &file_path)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(ApiError::from)?;
    Ok(content)
}
