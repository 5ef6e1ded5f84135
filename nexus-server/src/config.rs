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

//! Server configuration: TOML file, then environment overrides, following
//! `agentreplay_server::config::ServerConfig::load`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub server: HttpServerConfig,
    pub storage: StorageConfig,
    pub github: GithubConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_workspaces_root")]
    pub workspaces_root: PathBuf,
    #[serde(default = "default_replay_base_port")]
    pub replay_base_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_encryption_key_env")]
    pub encryption_key_env: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GithubConfig {
    pub default_token: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_workspaces_root() -> PathBuf {
    PathBuf::from("./nexus-data/workspaces")
}

fn default_replay_base_port() -> u16 {
    9000
}

fn default_database_url() -> String {
    "./nexus-data/nexus.db".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./nexus-data")
}

fn default_encryption_key_env() -> String {
    "NEXUS_ENCRYPTION_KEY".to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig {
                host: default_host(),
                port: default_port(),
                cors_origins: vec![],
                workspaces_root: default_workspaces_root(),
                replay_base_port: default_replay_base_port(),
            },
            storage: StorageConfig {
                database_url: default_database_url(),
                data_dir: default_data_dir(),
                encryption_key_env: default_encryption_key_env(),
            },
            github: GithubConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration: optional TOML file first, then environment
    /// variables override every field they name.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading configuration from file");
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        if let Ok(host) = std::env::var("NEXUS_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("NEXUS_PORT") {
            if let Ok(parsed) = port.parse() {
                config.server.port = parsed;
            }
        }
        if let Ok(origins) = std::env::var("NEXUS_CORS_ORIGINS") {
            config.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(root) = std::env::var("NEXUS_WORKSPACES_ROOT") {
            config.server.workspaces_root = PathBuf::from(root);
        }
        if let Ok(base_port) = std::env::var("NEXUS_REPLAY_BASE_PORT") {
            if let Ok(parsed) = base_port.parse() {
                config.server.replay_base_port = parsed;
            }
        }
        if let Ok(url) = std::env::var("NEXUS_DATABASE_URL") {
            config.storage.database_url = url;
        }
        if let Ok(dir) = std::env::var("NEXUS_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(token) = std::env::var("NEXUS_GITHUB_TOKEN") {
            config.github.default_token = Some(token);
        }
        if let Ok(base_url) = std::env::var("NEXUS_GITHUB_API_BASE_URL") {
            config.github.api_base_url = base_url;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be nonzero");
        }
        if self.server.replay_base_port < 1024 {
            anyhow::bail!("server.replay_base_port must be >= 1024");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(format!("{}:{}", self.server.host, self.server.port).parse()?)
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = ServerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
