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

//! The single `ApiError` that every handler converges on (spec.md §7),
//! mirroring `agentreplay_server::api::query::ApiError`: a flat enum of
//! HTTP-mappable kinds wrapped in a JSON `{ "error": <code>, "message": ? }`
//! body. No stack traces cross the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad input: {0}")]
    BadInput(String),
    #[error("unauthorized by upstream: {0}")]
    UnauthorizedByUpstream(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream timeout")]
    UpstreamTimeout,
    #[error("upstream network error: {0}")]
    UpstreamNetwork(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: u16,
    message: Option<String>,
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, Option<String>) {
        match self {
            ApiError::BadInput(m) => (StatusCode::BAD_REQUEST, Some(m.clone())),
            ApiError::UnauthorizedByUpstream(m) => (StatusCode::UNAUTHORIZED, Some(m.clone())),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, Some(m.clone())),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, Some(m.clone())),
            ApiError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, None),
            ApiError::UpstreamNetwork(m) => (StatusCode::SERVICE_UNAVAILABLE, Some(m.clone())),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, Some(m.clone())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let (status, message) = self.status_and_message();
        let body = ErrorBody {
            error: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<nexus_storage::StorageError> for ApiError {
    fn from(err: nexus_storage::StorageError) -> Self {
        match err {
            nexus_storage::StorageError::NotFound(m) => ApiError::NotFound(m),
            nexus_storage::StorageError::Conflict(m) => ApiError::Conflict(m),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<nexus_replay::ReplayError> for ApiError {
    fn from(err: nexus_replay::ReplayError) -> Self {
        match err {
            nexus_replay::ReplayError::BadInput(m) => ApiError::BadInput(m),
            nexus_replay::ReplayError::NotFound(m) => ApiError::NotFound(m),
            nexus_replay::ReplayError::Conflict(m) => ApiError::Conflict(m),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<nexus_github::GithubError> for ApiError {
    fn from(err: nexus_github::GithubError) -> Self {
        match err {
            nexus_github::GithubError::HttpStatus(401) | nexus_github::GithubError::HttpStatus(403) => {
                ApiError::UnauthorizedByUpstream(err.to_string())
            }
            nexus_github::GithubError::HttpStatus(404) => ApiError::NotFound(err.to_string()),
            nexus_github::GithubError::HttpStatus(code) => {
                ApiError::UnauthorizedByUpstream(format!("upstream returned {code}"))
            }
            nexus_github::GithubError::Timeout => ApiError::UpstreamTimeout,
            nexus_github::GithubError::Network(m) => ApiError::UpstreamNetwork(m),
            nexus_github::GithubError::Decode(m) => ApiError::Internal(m),
            nexus_github::GithubError::Internal(m) => ApiError::Internal(m),
        }
    }
}
