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

//! Scoped environment variables (C9): per-scope get/set plus the merged
//! overlay read used when launching a replay server.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use nexus_storage::envvars::Scope;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_global(State(state): State<AppState>) -> Result<Json<HashMap<String, String>>, ApiError> {
    Ok(Json(state.env_resolver.get_global().await.map_err(ApiError::from)?))
}

pub async fn set_global(
    State(state): State<AppState>,
    Json(vars): Json<HashMap<String, String>>,
) -> Result<(), ApiError> {
    state
        .env_resolver
        .set(Scope::Global, None, None, &vars)
        .await
        .map_err(ApiError::from)
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(repo_id): Path<i64>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    Ok(Json(
        state.env_resolver.get_project(repo_id).await.map_err(ApiError::from)?,
    ))
}

pub async fn set_project(
    State(state): State<AppState>,
    Path(repo_id): Path<i64>,
    Json(vars): Json<HashMap<String, String>>,
) -> Result<(), ApiError> {
    state
        .env_resolver
        .set(Scope::Project, Some(repo_id), None, &vars)
        .await
        .map_err(ApiError::from)
}

pub async fn get_commit(
    State(state): State<AppState>,
    Path((repo_id, commit_hash)): Path<(i64, String)>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    Ok(Json(
        state
            .env_resolver
            .get_commit(repo_id, &commit_hash)
            .await
            .map_err(ApiError::from)?,
    ))
}

pub async fn set_commit(
    State(state): State<AppState>,
    Path((repo_id, commit_hash)): Path<(i64, String)>,
    Json(vars): Json<HashMap<String, String>>,
) -> Result<(), ApiError> {
    state
        .env_resolver
        .set(Scope::Commit, Some(repo_id), Some(&commit_hash), &vars)
        .await
        .map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
pub struct MergedQuery {
    pub commit_hash: String,
}

pub async fn get_merged(
    State(state): State<AppState>,
    Path(repo_id): Path<i64>,
    Query(params): Query<MergedQuery>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    Ok(Json(
        state
            .env_resolver
            .get_merged(repo_id, &params.commit_hash)
            .await
            .map_err(ApiError::from)?,
    ))
}
