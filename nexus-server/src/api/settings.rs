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

//! Thin `AppConfig` pass-through settings: token, download path, theme,
//! last-viewed repo, and watchlist export/import.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use nexus_storage::config_store::{KEY_DOWNLOAD_PATH, KEY_LAST_REPO_ID, KEY_THEME};

use crate::error::ApiError;
use crate::state::AppState;
use crate::token_resolver::RedactedToken;

pub async fn get_token(State(state): State<AppState>) -> Json<RedactedToken> {
    Json(state.token_resolver.redacted_source_view().await)
}

#[derive(Debug, Deserialize)]
pub struct SetTokenRequest {
    pub token: String,
}

pub async fn set_token(
    State(state): State<AppState>,
    Json(body): Json<SetTokenRequest>,
) -> Result<(), ApiError> {
    state.token_resolver.set_token(&body.token).await.map_err(ApiError::from)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StringValue {
    pub value: Option<String>,
}

async fn get_value(state: &AppState, key: &str) -> Result<Json<StringValue>, ApiError> {
    let value = state.config_store.get(key).await.map_err(ApiError::from)?;
    Ok(Json(StringValue { value }))
}

async fn set_value(state: &AppState, key: &str, value: &str) -> Result<(), ApiError> {
    state.config_store.set(key, value).await.map_err(ApiError::from)
}

pub async fn get_download_path(State(state): State<AppState>) -> Result<Json<StringValue>, ApiError> {
    get_value(&state, KEY_DOWNLOAD_PATH).await
}

pub async fn set_download_path(
    State(state): State<AppState>,
    Json(body): Json<StringValue>,
) -> Result<(), ApiError> {
    let value = body.value.unwrap_or_default();
    set_value(&state, KEY_DOWNLOAD_PATH, &value).await
}

pub async fn get_theme(State(state): State<AppState>) -> Result<Json<StringValue>, ApiError> {
    get_value(&state, KEY_THEME).await
}

pub async fn set_theme(
    State(state): State<AppState>,
    Json(body): Json<StringValue>,
) -> Result<(), ApiError> {
    let value = body.value.unwrap_or_default();
    set_value(&state, KEY_THEME, &value).await
}

pub async fn get_last_repo(State(state): State<AppState>) -> Result<Json<StringValue>, ApiError> {
    get_value(&state, KEY_LAST_REPO_ID).await
}

pub async fn set_last_repo(
    State(state): State<AppState>,
    Json(body): Json<StringValue>,
) -> Result<(), ApiError> {
    let value = body.value.unwrap_or_default();
    set_value(&state, KEY_LAST_REPO_ID, &value).await
}

/// The portable shape for watchlist export/import: just the identity and
/// current-version triple every round trip must preserve (spec.md §8).
#[derive(Debug, Serialize, Deserialize)]
pub struct WatchlistExportEntry {
    pub owner: String,
    pub repo_name: String,
    pub current_version: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
}

pub async fn export_watchlist(
    State(state): State<AppState>,
) -> Result<Json<Vec<WatchlistExportEntry>>, ApiError> {
    let repos = state.watchlist.list().await.map_err(ApiError::from)?;
    let entries = repos
        .into_iter()
        .map(|r| WatchlistExportEntry {
            owner: r.owner,
            repo_name: r.repo_name,
            current_version: r.current_version,
            description: r.description,
            avatar_url: r.avatar_url,
            html_url: r.html_url,
        })
        .collect();
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

pub async fn import_watchlist(
    State(state): State<AppState>,
    Json(entries): Json<Vec<WatchlistExportEntry>>,
) -> Result<Json<ImportSummary>, ApiError> {
    let mut imported = 0;
    let mut skipped = 0;

    for entry in entries {
        match state
            .watchlist
            .add(
                &entry.owner,
                &entry.repo_name,
                entry.description.as_deref(),
                entry.avatar_url.as_deref(),
                entry.html_url.as_deref(),
            )
            .await
        {
            Ok(tracked) => {
                state
                    .watchlist
                    .set_current_version(tracked.id, &entry.current_version)
                    .await
                    .map_err(ApiError::from)?;
                imported += 1;
            }
            Err(nexus_storage::StorageError::Conflict(_)) => skipped += 1,
            Err(e) => return Err(ApiError::from(e)),
        }
    }

    Ok(Json(ImportSummary { imported, skipped }))
}
