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

//! Per-tracked-repo release listing (C10), refetched through C3 when the
//! cache group is stale, plus an SSRF-checked asset download.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use nexus_storage::releases::{CachedRelease, ReleaseAsset};

use crate::api::common::{record_rate_limit, TokenAndRefresh};
use crate::error::ApiError;
use crate::security;
use crate::state::AppState;

const RELEASE_FETCH_LIMIT: u32 = 30;

pub async fn list(
    State(state): State<AppState>,
    Path(repo_id): Path<i64>,
    Query(params): Query<TokenAndRefresh>,
) -> Result<Json<Vec<CachedRelease>>, ApiError> {
    if !params.refresh {
        if let Some(cached) = state.releases.get(repo_id).await.map_err(ApiError::from)? {
            return Ok(Json(cached));
        }
    }

    let repo = state.watchlist.get(repo_id).await.map_err(ApiError::from)?;
    let resolved = state.token_resolver.resolve(params.token.as_deref()).await;

    let resp = state
        .github
        .fetch_releases(&repo.owner, &repo.repo_name, resolved.token.as_deref(), RELEASE_FETCH_LIMIT)
        .await
        .map_err(ApiError::from)?;

    record_rate_limit(&state, resp.rate_limit).await;

    let rows: Vec<_> = resp
        .data
        .into_iter()
        .map(|release| {
            let assets = release
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    id: Some(a.id),
                    name: a.name,
                    size: a.size,
                    download_url: a.browser_download_url,
                    content_type: a.content_type,
                })
                .collect();
            (
                release.tag_name,
                release.name,
                Some(release.html_url),
                release.published_at,
                release.prerelease,
                assets,
                release.zipball_url,
                release.tarball_url,
            )
        })
        .collect();

    state.releases.put(repo_id, &rows).await.map_err(ApiError::from)?;

    let refreshed = state
        .releases
        .get(repo_id)
        .await
        .map_err(ApiError::from)?
        .unwrap_or_default();
    Ok(Json(refreshed))
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub file_name: String,
    pub token: Option<String>,
}

pub async fn download_asset(
    State(state): State<AppState>,
    Json(body): Json<DownloadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    security::validate_download_url(&body.url).map_err(|e| ApiError::BadInput(e.to_string()))?;

    let download_root = state
        .config_store
        .get(nexus_storage::config_store::KEY_DOWNLOAD_PATH)
        .await
        .map_err(ApiError::from)?
        .unwrap_or_else(|| ".".to_string());

    let safe_name = security::sanitize_filename(&body.file_name);
    let destination = std::path::Path::new(&download_root).join(&safe_name);

    let resolved = state.token_resolver.resolve(body.token.as_deref()).await;
    let written = state
        .github
        .stream_asset(&body.url, resolved.token.as_deref(), &destination)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(serde_json::json!({
        "path": destination.display().to_string(),
        "bytes_written": written,
    })))
}
