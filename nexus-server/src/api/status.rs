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

//! API rate-limit status (C5). A stale snapshot triggers an explicit
//! refetch against `/rate_limit` using the best available credential
//! before answering, rather than serving an expired number.

use axum::extract::State;
use axum::Json;

use nexus_storage::ratelimit::ApiStatus;

use crate::api::common::record_rate_limit;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_status(State(state): State<AppState>) -> Result<Json<Option<ApiStatus>>, ApiError> {
    if state.rate_limit.is_stale().await.map_err(ApiError::from)? {
        let resolved = state.token_resolver.resolve(None).await;
        match state.github.fetch_rate_limit(resolved.token.as_deref()).await {
            Ok(resp) => record_rate_limit(&state, resp.rate_limit).await,
            Err(e) => {
                tracing::warn!(error = %e, "rate-limit refetch failed, serving stale/absent snapshot");
            }
        }
    }

    let status = state.rate_limit.get().await.map_err(ApiError::from)?;
    Ok(Json(status))
}
