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

//! Edge validation: the asset-download SSRF allow-list (spec.md §6) and
//! filename sanitization (spec.md §8 round-trip law).

use std::net::IpAddr;

const ALLOWED_HOSTS: &[&str] = &[
    "github.com",
    "api.github.com",
    "raw.githubusercontent.com",
    "objects.githubusercontent.com",
    "github-releases.githubusercontent.com",
    "codeload.github.com",
];

#[derive(Debug, thiserror::Error)]
pub enum UrlValidationError {
    #[error("url must use https")]
    NotHttps,
    #[error("url host is not on the GitHub allow-list")]
    HostNotAllowed,
    #[error("url host resolves to a private, loopback, or reserved address")]
    DisallowedAddress,
    #[error("malformed url")]
    Malformed,
}

/// Validates a candidate asset-download URL. Requires `https`, a host on
/// the GitHub domain allow-list, and (when the host resolves) an address
/// that is not private/loopback/reserved. DNS failure is treated as
/// "the allow-list is authoritative" and permitted through.
pub fn validate_download_url(url: &str) -> Result<(), UrlValidationError> {
    let parsed = url::Url::parse(url).map_err(|_| UrlValidationError::Malformed)?;

    if parsed.scheme() != "https" {
        return Err(UrlValidationError::NotHttps);
    }

    let host = parsed.host_str().ok_or(UrlValidationError::Malformed)?;
    if !ALLOWED_HOSTS.contains(&host) {
        return Err(UrlValidationError::HostNotAllowed);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_disallowed_address(&ip) {
            return Err(UrlValidationError::DisallowedAddress);
        }
        return Ok(());
    }

    use std::net::ToSocketAddrs;
    match (host, 443u16).to_socket_addrs() {
        Ok(addrs) => {
            for addr in addrs {
                if is_disallowed_address(&addr.ip()) {
                    return Err(UrlValidationError::DisallowedAddress);
                }
            }
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

fn is_disallowed_address(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified() || v4.is_broadcast()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

/// Strips directory components and control characters from a user-supplied
/// filename, leaving a name safe to place directly under a single
/// destination directory. Idempotent: sanitizing an already-sanitized
/// name is a no-op.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();

    while cleaned == "." || cleaned == ".." {
        cleaned.push('_');
    }

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_https() {
        assert!(matches!(
            validate_download_url("http://api.github.com/x"),
            Err(UrlValidationError::NotHttps)
        ));
    }

    #[test]
    fn rejects_host_off_allow_list() {
        assert!(matches!(
            validate_download_url("https://evil.example.com/x"),
            Err(UrlValidationError::HostNotAllowed)
        ));
    }

    #[test]
    fn rejects_loopback_ip_literal() {
        assert!(matches!(
            validate_download_url("https://127.0.0.1/x"),
            Err(UrlValidationError::HostNotAllowed)
        ));
    }

    #[test]
    fn accepts_allow_listed_host() {
        assert!(validate_download_url("https://api.github.com/repos/a/b/releases/assets/1").is_ok());
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a/b/c.zip"), "c.zip");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["normal.txt", "../../etc/passwd", "con:trol\u{0007}.bin", ""] {
            let once = sanitize_filename(raw);
            let twice = sanitize_filename(&once);
            assert_eq!(once, twice);
        }
    }

    proptest::proptest! {
        #[test]
        fn sanitize_is_idempotent_arbitrary(s in ".*") {
            let once = sanitize_filename(&s);
            let twice = sanitize_filename(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
