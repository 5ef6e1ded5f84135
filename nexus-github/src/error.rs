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

//! The structured outcome kind returned by every `GithubClient` operation
//! (spec.md §4.2). The client never raises across its boundary for
//! expected failures; every path returns `Result<_, GithubError>`.

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GithubError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GithubError::Timeout
        } else if err.is_decode() {
            GithubError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            GithubError::HttpStatus(status.as_u16())
        } else {
            GithubError::Network(err.to_string())
        }
    }
}

pub type GithubResult<T> = Result<T, GithubError>;
