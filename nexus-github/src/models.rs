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

//! Wire shapes for the subset of the GitHub REST v3 API Nexus consumes.
//! Deliberately partial: unknown fields are ignored by serde by default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubProfile {
    pub login: String,
    pub id: i64,
    pub name: Option<String>,
    pub avatar_url: String,
    pub html_url: String,
    pub bio: Option<String>,
    pub public_repos: i64,
    pub followers: i64,
    pub following: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubRepo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub language: Option<String>,
    pub stargazers_count: i64,
    pub forks_count: i64,
    pub pushed_at: Option<DateTime<Utc>>,
    pub owner: GithubOwner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubOwner {
    pub login: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubCommit {
    pub sha: String,
    pub commit: GithubCommitDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubCommitDetail {
    pub message: String,
    pub author: GithubCommitAuthor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubCommitAuthor {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubRelease {
    pub tag_name: String,
    pub name: Option<String>,
    pub html_url: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
    pub zipball_url: Option<String>,
    pub tarball_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubAsset {
    pub id: i64,
    pub name: String,
    pub size: i64,
    pub browser_download_url: String,
    pub content_type: String,
}

/// Sort order for the user-repositories listing; GitHub's `sort`/`direction`
/// query params.
#[derive(Debug, Clone, Copy)]
pub enum RepoSort {
    NewestPushed,
    Alphabetical,
    MostStars,
}

impl RepoSort {
    pub fn query_params(self) -> (&'static str, &'static str) {
        match self {
            RepoSort::NewestPushed => ("pushed", "desc"),
            RepoSort::Alphabetical => ("full_name", "asc"),
            RepoSort::MostStars => ("stars", "desc"),
        }
    }
}

impl Default for RepoSort {
    fn default() -> Self {
        RepoSort::NewestPushed
    }
}
