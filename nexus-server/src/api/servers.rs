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

//! Replay server lifecycle (C8): materialize a commit into a workspace,
//! hand it to the orchestrator, and expose start/stop/list/remove.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use nexus_core::CommitHash;
use nexus_replay::worktree::WorktreeManager;
use nexus_replay::ReplayInstance;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub commit_hash: String,
    pub preferred_port: Option<u16>,
}

pub async fn start(
    State(state): State<AppState>,
    Path(repo_id): Path<i64>,
    Json(body): Json<StartRequest>,
) -> Result<Json<ReplayInstance>, ApiError> {
    let commit_hash = CommitHash::parse(&body.commit_hash).map_err(|e| ApiError::BadInput(e.to_string()))?;

    let repo = state.replay_repos.get(repo_id).await.map_err(ApiError::from)?;

    let commit = state
        .replay_repos
        .find_by_hash(repo_id, commit_hash.as_str())
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("commit {} not tracked for this repo", commit_hash)))?;

    let workspace = state
        .config
        .server
        .workspaces_root
        .join(repo_id.to_string())
        .join(&commit.hash);

    let repo_path = repo.path.clone();
    let checkout_hash = commit.hash.clone();
    let checkout_dir = workspace.clone();
    tokio::task::spawn_blocking(move || {
        WorktreeManager::checkout_to_worktree(
            std::path::Path::new(&repo_path),
            &checkout_hash,
            &checkout_dir,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(ApiError::from)?;

    let env = state
        .env_resolver
        .get_merged(repo_id, &commit.hash)
        .await
        .map_err(ApiError::from)?;

    let instance = state
        .orchestrator
        .start(
            repo_id,
            &repo.name,
            &repo.path,
            &commit.hash,
            &workspace,
            env,
            body.preferred_port,
        )
        .await
        .map_err(ApiError::from)?;

    Ok(Json(instance))
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<ReplayInstance>> {
    Json(state.orchestrator.list().await)
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReplayInstance>, ApiError> {
    state
        .orchestrator
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no replay instance with id {id}")))
}

pub async fn stop(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ApiError> {
    state.orchestrator.stop(&id).await.map_err(ApiError::from)
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Result<(), ApiError> {
    state.orchestrator.remove(&id).await.map_err(ApiError::from)
}

pub async fn stop_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    let results = state.orchestrator.stop_all().await;
    let stopped = results.iter().filter(|(_, r)| r.is_ok()).count();
    Json(serde_json::json!({ "stopped": stopped, "total": results.len() }))
}
