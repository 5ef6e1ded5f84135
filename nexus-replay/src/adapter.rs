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

//! The adapter contract (spec.md §9): the only extension point for the
//! replay orchestrator. `StaticHtmlAdapter` is the only required adapter;
//! future adapters (dynamic runtimes) plug in here unchanged.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::error::{ReplayError, ReplayResult};

#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns true iff this adapter can serve `workspace`.
    fn validate(&self, workspace: &Path) -> bool;

    /// Spawn a child process bound to `127.0.0.1:<port>` serving `workspace`.
    async fn start(
        &self,
        workspace: &Path,
        port: u16,
        env: &HashMap<String, String>,
    ) -> ReplayResult<Child>;

    /// URL a client should hit to reach the served workspace.
    fn get_url(&self, port: u16) -> String {
        format!("http://127.0.0.1:{port}/")
    }
}

/// Serves a workspace whose root contains `index.html` as a static site.
pub struct StaticHtmlAdapter;

#[async_trait::async_trait]
impl Adapter for StaticHtmlAdapter {
    fn name(&self) -> &'static str {
        "static-html"
    }

    fn validate(&self, workspace: &Path) -> bool {
        workspace.join("index.html").is_file()
    }

    async fn start(
        &self,
        workspace: &Path,
        port: u16,
        env: &HashMap<String, String>,
    ) -> ReplayResult<Child> {
        // A tiny, dependency-free static file server: run this same binary
        // re-exec'd with `--serve-static`, bound to loopback only.
        let exe = std::env::current_exe()
            .map_err(|e| ReplayError::Internal(format!("cannot resolve current exe: {e}")))?;

        let mut command = Command::new(exe);
        command
            .arg("--serve-static")
            .arg(workspace)
            .arg("127.0.0.1")
            .arg(port.to_string())
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command
            .spawn()
            .map_err(|e| ReplayError::Internal(format!("failed to spawn static server: {e}")))
    }
}

/// Select the first adapter that validates against `workspace`, or describe
/// why none did (spec.md §4.7: "a helpful error listing up to ten file
/// names observed in the workspace").
pub fn select_adapter<'a>(
    adapters: &'a [Box<dyn Adapter>],
    workspace: &Path,
) -> Result<&'a dyn Adapter, String> {
    for adapter in adapters {
        if adapter.validate(workspace) {
            return Ok(adapter.as_ref());
        }
    }

    let mut names: Vec<String> = std::fs::read_dir(workspace)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .take(10)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();

    Err(format!(
        "no adapter could serve this workspace; observed files: [{}]",
        names.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_html_adapter_requires_index_html() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = StaticHtmlAdapter;
        assert!(!adapter.validate(dir.path()));
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        assert!(adapter.validate(dir.path()));
    }

    #[test]
    fn select_adapter_errors_list_up_to_ten_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..15 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let adapters: Vec<Box<dyn Adapter>> = vec![Box::new(StaticHtmlAdapter)];
        let err = select_adapter(&adapters, dir.path()).unwrap_err();
        assert!(err.contains("f0.txt") || err.contains("observed files"));
    }
}
