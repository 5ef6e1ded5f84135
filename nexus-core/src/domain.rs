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

//! Domain types shared by more than one crate in the workspace.

use serde::{Deserialize, Serialize};

/// Where an effective GitHub credential was sourced from.
///
/// The four values are preserved verbatim for wire compatibility even
/// though `Authed` and `Env`/`Db` overlap in meaning (`Authed` means "some
/// credential was attached but we don't know which").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Request,
    Env,
    Db,
    Authed,
    None,
}

impl TokenSource {
    /// True for any source that represents an authenticated request.
    pub fn is_authenticated(self) -> bool {
        !matches!(self, TokenSource::None)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenSource::Request => "request",
            TokenSource::Env => "env",
            TokenSource::Db => "db",
            TokenSource::Authed => "authed",
            TokenSource::None => "none",
        }
    }
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenSource {
    type Err = crate::error::NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(TokenSource::Request),
            "env" => Ok(TokenSource::Env),
            "db" => Ok(TokenSource::Db),
            "authed" => Ok(TokenSource::Authed),
            "none" => Ok(TokenSource::None),
            other => Err(crate::error::NexusError::new(
                crate::error::ErrorKind::BadInput,
                format!("unknown token source: {other}"),
            )),
        }
    }
}

/// A validated commit hash: 7-40 hex characters, purely alphanumeric.
///
/// Anything accepted into the replay orchestrator must already have passed
/// through this constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn parse(raw: &str) -> Result<Self, crate::error::NexusError> {
        let len = raw.len();
        if !(7..=40).contains(&len) || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::error::NexusError::new(
                crate::error::ErrorKind::BadInput,
                format!("invalid commit hash: {raw}"),
            ));
        }
        Ok(CommitHash(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_seven_to_forty_hex_chars() {
        assert!(CommitHash::parse("abc1234").is_ok());
        assert!(CommitHash::parse(&"a".repeat(40)).is_ok());
    }

    #[test]
    fn rejects_short_long_or_non_hex() {
        assert!(CommitHash::parse("abc12").is_err());
        assert!(CommitHash::parse(&"a".repeat(41)).is_err());
        assert!(CommitHash::parse("abc123g").is_err());
        assert!(CommitHash::parse("; rm -rf").is_err());
    }
}
