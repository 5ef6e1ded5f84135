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

//! Symmetric authenticated encryption for values at rest (tokens, env vars).
//!
//! The algorithm is AES-256-GCM; the contract (key resolution order,
//! empty-plaintext passthrough, base64 wire format) is what the rest of the
//! workspace depends on, not the specific cipher.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::path::{Path, PathBuf};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed ciphertext")]
    MalformedCiphertext,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("no encryption key available")]
    NoKey,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves the 32-byte symmetric key: environment variable wins over the
/// legacy key-file fallback under the data directory, per spec.md §6.
pub struct KeyResolver {
    env_var: String,
    key_file: PathBuf,
}

impl KeyResolver {
    pub fn new(env_var: impl Into<String>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            env_var: env_var.into(),
            key_file: data_dir.as_ref().join("nexus.key"),
        }
    }

    /// Resolve the key, creating (and persisting) a fresh one in the key
    /// file if neither source has one yet.
    pub fn resolve_or_create(&self) -> Result<[u8; KEY_LEN], CryptoError> {
        if let Ok(raw) = std::env::var(&self.env_var) {
            if let Some(key) = decode_key(&raw) {
                return Ok(key);
            }
            tracing::warn!(env_var = %self.env_var, "encryption key env var set but malformed, ignoring");
        }

        if self.key_file.exists() {
            let raw = std::fs::read_to_string(&self.key_file)?;
            if let Some(key) = decode_key(raw.trim()) {
                return Ok(key);
            }
            tracing::warn!(path = %self.key_file.display(), "key file malformed, regenerating");
        }

        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        if let Some(parent) = self.key_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.key_file, STANDARD.encode(key))?;
        Ok(key)
    }
}

fn decode_key(raw: &str) -> Option<[u8; KEY_LEN]> {
    let bytes = STANDARD.decode(raw.trim()).ok()?;
    bytes.try_into().ok()
}

/// A ready-to-use AES-256-GCM box over a resolved key.
#[derive(Clone)]
pub struct CryptoBox {
    cipher: Aes256Gcm,
}

impl CryptoBox {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        Self { cipher }
    }

    /// Encrypt `plaintext` into a base64 string of `nonce || ciphertext`.
    ///
    /// Empty plaintext maps to an empty ciphertext with no encryption
    /// performed, per the env-var resolver contract (spec.md §4.8).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a base64 `nonce || ciphertext` string back to plaintext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|_| CryptoError::MalformedCiphertext)?;
        if raw.len() < NONCE_LEN {
            return Err(CryptoError::MalformedCiphertext);
        }
        let (nonce_bytes, body) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, body)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_box() -> CryptoBox {
        CryptoBox::new([7u8; KEY_LEN])
    }

    #[test]
    fn round_trips_plaintext() {
        let cb = test_box();
        let ct = cb.encrypt("hunter2").unwrap();
        assert_ne!(ct, "hunter2");
        assert_eq!(cb.decrypt(&ct).unwrap(), "hunter2");
    }

    #[test]
    fn empty_plaintext_maps_to_empty_ciphertext() {
        let cb = test_box();
        let ct = cb.encrypt("").unwrap();
        assert_eq!(ct, "");
        assert_eq!(cb.decrypt(&ct).unwrap(), "");
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cb = test_box();
        let mut ct = cb.encrypt("secret-value").unwrap();
        ct.push('A');
        assert!(cb.decrypt(&ct).is_err());
    }

    #[test]
    fn key_resolver_prefers_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let key_b64 = STANDARD.encode([9u8; KEY_LEN]);
        std::fs::write(dir.path().join("nexus.key"), STANDARD.encode([1u8; KEY_LEN])).unwrap();
        std::env::set_var("NEXUS_TEST_KEY_PREC", &key_b64);
        let resolver = KeyResolver::new("NEXUS_TEST_KEY_PREC", dir.path());
        let resolved = resolver.resolve_or_create().unwrap();
        assert_eq!(resolved, [9u8; KEY_LEN]);
        std::env::remove_var("NEXUS_TEST_KEY_PREC");
    }

    proptest::proptest! {
        #[test]
        fn round_trip_is_lossless(s in ".*") {
            let cb = test_box();
            let ct = cb.encrypt(&s).unwrap();
            let decrypted = cb.decrypt(&ct).unwrap();
            proptest::prop_assert_eq!(decrypted, s);
        }
    }
}
