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

//! Watchlist CRUD and the bounded-concurrency "check updates" trigger (C6).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use nexus_storage::watchlist::TrackedRepo;

use crate::error::ApiError;
use crate::state::AppState;
use crate::watchlist_engine::CheckUpdatesSummary;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<TrackedRepo>>, ApiError> {
    Ok(Json(state.watchlist.list().await.map_err(ApiError::from)?))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TrackedRepo>, ApiError> {
    Ok(Json(state.watchlist.get(id).await.map_err(ApiError::from)?))
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub owner: String,
    pub repo_name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
}

pub async fn add(
    State(state): State<AppState>,
    Json(body): Json<AddRequest>,
) -> Result<Json<TrackedRepo>, ApiError> {
    if body.owner.trim().is_empty() || body.repo_name.trim().is_empty() {
        return Err(ApiError::BadInput("owner and repo_name are required".into()));
    }
    let repo = state
        .watchlist
        .add(
            body.owner.trim(),
            body.repo_name.trim(),
            body.description.as_deref(),
            body.avatar_url.as_deref(),
            body.html_url.as_deref(),
        )
        .await
        .map_err(ApiError::from)?;
    Ok(Json(repo))
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> Result<(), ApiError> {
    state.watchlist.remove(id).await.map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ordered_ids: Vec<i64>,
}

pub async fn reorder(
    State(state): State<AppState>,
    Json(body): Json<ReorderRequest>,
) -> Result<(), ApiError> {
    state
        .watchlist
        .reorder(&body.ordered_ids)
        .await
        .map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
pub struct CheckUpdatesRequest {
    pub token: Option<String>,
}

pub async fn check_updates(
    State(state): State<AppState>,
    Query(params): Query<CheckUpdatesRequest>,
) -> Result<Json<CheckUpdatesSummary>, ApiError> {
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;
    let summary = state
        .watchlist_engine
        .check_updates(resolved.token.as_deref())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(summary))
}
