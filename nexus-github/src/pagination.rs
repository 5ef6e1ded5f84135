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

//! Link-header pagination (spec.md §4.2): `per_page=100` walk for list
//! endpoints, and the `page=<N>` extraction trick for the commit-count
//! operation.

use regex::Regex;

/// Parse a `Link` response header and return the `rel="next"` URL, if any.
pub fn next_link(link_header: Option<&str>) -> Option<String> {
    parse_rel(link_header, "next")
}

/// Parse a `Link` response header and return the `page=<N>` query parameter
/// of its `rel="last"` entry.
pub fn last_page_number(link_header: Option<&str>) -> Option<u64> {
    let last_url = parse_rel(link_header, "last")?;
    extract_page_param(&last_url)
}

fn parse_rel(link_header: Option<&str>, rel: &str) -> Option<String> {
    let header = link_header?;
    for part in header.split(',') {
        let mut segments = part.split(';').map(str::trim);
        let url_part = segments.next()?;
        let rel_matches = segments.any(|seg| seg == format!("rel=\"{rel}\""));
        if rel_matches {
            let url = url_part.trim_start_matches('<').trim_end_matches('>');
            return Some(url.to_string());
        }
    }
    None
}

fn extract_page_param(url: &str) -> Option<u64> {
    let re = Regex::new(r"[?&]page=(\d+)").ok()?;
    let caps = re.captures(url)?;
    caps.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<https://api.github.com/resource?page=2>; rel="next", <https://api.github.com/resource?page=42>; rel="last""#;

    #[test]
    fn extracts_next_link() {
        assert_eq!(
            next_link(Some(SAMPLE)),
            Some("https://api.github.com/resource?page=2".to_string())
        );
    }

    #[test]
    fn extracts_last_page_number() {
        assert_eq!(last_page_number(Some(SAMPLE)), Some(42));
    }

    #[test]
    fn missing_header_yields_none() {
        assert_eq!(next_link(None), None);
        assert_eq!(last_page_number(None), None);
    }

    #[test]
    fn header_without_next_yields_none() {
        let header = r#"<https://api.github.com/resource?page=1>; rel="prev""#;
        assert_eq!(next_link(Some(header)), None);
    }
}
