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

//! Shared query-parameter shapes and the rate-limit recording glue used by
//! every discovery handler.

use serde::Deserialize;

use crate::state::AppState;

/// Every discovery-style GET accepts an optional per-request token override
/// and a `refresh` flag that forces the coalescing cache to miss.
#[derive(Debug, Deserialize)]
pub struct TokenAndRefresh {
    pub token: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

/// Forward a GitHub client's rate-limit observation (if any) into the
/// tracker. Failures are logged and swallowed — this must never break the
/// request path (spec.md §7).
pub async fn record_rate_limit(state: &AppState, observation: Option<nexus_github::RateLimitObservation>) {
    let Some(obs) = observation else { return };
    let mapped = nexus_storage::ratelimit::RateLimitObservation {
        limit: obs.limit,
        remaining: obs.remaining,
        reset_time_unix: obs.reset_time_unix,
        source: obs.source,
    };
    if let Err(e) = state.rate_limit.observe(mapped).await {
        tracing::warn!(error = %e, "failed to persist rate-limit observation");
    }
}
