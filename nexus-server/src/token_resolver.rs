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

//! The token resolver (C2): pick the effective GitHub credential from
//! (request > environment > encrypted store) and report its source.

use nexus_core::TokenSource;
use nexus_crypto::CryptoBox;
use nexus_storage::config_store::{AppConfigStore, KEY_GITHUB_TOKEN};

pub struct TokenResolver {
    config_store: AppConfigStore,
    crypto: CryptoBox,
    env_token: Option<String>,
}

/// The resolved credential alongside the source downstream consumers
/// (notably the rate-limit tracker) attribute quota ownership to.
#[derive(Debug, Clone)]
pub struct ResolvedToken {
    pub token: Option<String>,
    pub source: TokenSource,
}

impl TokenResolver {
    pub fn new(config_store: AppConfigStore, crypto: CryptoBox, env_token: Option<String>) -> Self {
        Self {
            config_store,
            crypto,
            env_token,
        }
    }

    /// Resolution order: request-scoped token (trimmed, non-empty) > env >
    /// decrypted DB value > none. Decryption failure is logged and folded
    /// into `none` without surfacing to the caller.
    pub async fn resolve(&self, request_token: Option<&str>) -> ResolvedToken {
        if let Some(t) = request_token {
            let trimmed = t.trim();
            if !trimmed.is_empty() {
                return ResolvedToken {
                    token: Some(trimmed.to_string()),
                    source: TokenSource::Request,
                };
            }
        }

        if let Some(env_token) = &self.env_token {
            if !env_token.trim().is_empty() {
                return ResolvedToken {
                    token: Some(env_token.clone()),
                    source: TokenSource::Env,
                };
            }
        }

        match self.config_store.get(KEY_GITHUB_TOKEN).await {
            Ok(Some(ciphertext)) if !ciphertext.is_empty() => match self.crypto.decrypt(&ciphertext) {
                Ok(plaintext) if !plaintext.is_empty() => {
                    return ResolvedToken {
                        token: Some(plaintext),
                        source: TokenSource::Db,
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decrypt stored GitHub token");
                }
            },
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stored GitHub token");
            }
        }

        ResolvedToken {
            token: None,
            source: TokenSource::None,
        }
    }

    /// Persist a new token, encrypted at rest. An empty string clears it.
    pub async fn set_token(&self, plaintext: &str) -> Result<(), nexus_storage::StorageError> {
        let ciphertext = self
            .crypto
            .encrypt(plaintext)
            .map_err(|e| nexus_storage::StorageError::Database(sqlx::Error::Protocol(e.to_string())))?;
        self.config_store.set(KEY_GITHUB_TOKEN, &ciphertext).await
    }

    /// A settings-facing view that never returns plaintext: confirms a
    /// token is configured via `sk-***last4`-style masking (supplemented
    /// from `original_source`'s `token_service.get_redacted_token`).
    pub async fn redacted_source_view(&self) -> RedactedToken {
        let resolved = self.resolve(None).await;
        match resolved.token {
            Some(token) => RedactedToken {
                configured: true,
                source: resolved.source,
                redacted: redact(&token),
            },
            None => RedactedToken {
                configured: false,
                source: resolved.source,
                redacted: None,
            },
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RedactedToken {
    pub configured: bool,
    pub source: TokenSource,
    pub redacted: Option<String>,
}

fn redact(token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    let tail: String = token.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    Some(format!("***{tail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn test_resolver(env_token: Option<&str>) -> TokenResolver {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::migrate!("../nexus-storage/migrations").run(&pool).await.unwrap();
        TokenResolver::new(
            AppConfigStore::new(pool),
            CryptoBox::new([5u8; 32]),
            env_token.map(String::from),
        )
    }

    #[tokio::test]
    async fn request_token_wins_over_everything() {
        let resolver = test_resolver(Some("env-token")).await;
        resolver.set_token("db-token").await.unwrap();
        let resolved = resolver.resolve(Some("  req-token  ")).await;
        assert_eq!(resolved.token.as_deref(), Some("req-token"));
        assert_eq!(resolved.source, TokenSource::Request);
    }

    #[tokio::test]
    async fn env_wins_over_db() {
        let resolver = test_resolver(Some("env-token")).await;
        resolver.set_token("db-token").await.unwrap();
        let resolved = resolver.resolve(None).await;
        assert_eq!(resolved.token.as_deref(), Some("env-token"));
        assert_eq!(resolved.source, TokenSource::Env);
    }

    #[tokio::test]
    async fn falls_back_to_decrypted_db_value() {
        let resolver = test_resolver(None).await;
        resolver.set_token("db-token").await.unwrap();
        let resolved = resolver.resolve(None).await;
        assert_eq!(resolved.token.as_deref(), Some("db-token"));
        assert_eq!(resolved.source, TokenSource::Db);
    }

    #[tokio::test]
    async fn none_when_nothing_configured() {
        let resolver = test_resolver(None).await;
        let resolved = resolver.resolve(None).await;
        assert_eq!(resolved.token, None);
        assert_eq!(resolved.source, TokenSource::None);
    }

    #[tokio::test]
    async fn blank_request_token_falls_through() {
        let resolver = test_resolver(Some("env-token")).await;
        let resolved = resolver.resolve(Some("   ")).await;
        assert_eq!(resolved.source, TokenSource::Env);
    }

    #[tokio::test]
    async fn redacted_view_never_exposes_plaintext() {
        let resolver = test_resolver(None).await;
        resolver.set_token("ghp_1234567890abcdef").await.unwrap();
        let view = resolver.redacted_source_view().await;
        assert!(view.configured);
        assert_eq!(view.redacted.as_deref(), Some("***cdef"));
    }
}
