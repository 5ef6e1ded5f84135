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

//! The replay orchestrator (C8): per-(repo, commit) server instances —
//! adapter selection, port allocation, child process lifecycle, merged
//! env injection, graceful and forced shutdown.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::RwLock;

use crate::adapter::{select_adapter, Adapter};
use crate::error::{ReplayError, ReplayResult};

const MIN_PORT: u16 = 1024;
const MAX_PORT: u16 = 65535;
const MAX_PORT_PROBE: u32 = 1000;
const MAX_START_ATTEMPTS: u32 = 3;
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const LIVENESS_PROBE_DELAY: Duration = Duration::from_millis(500);
const STDOUT_STDERR_CAPTURE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayInstance {
    pub id: String,
    pub repo_id: i64,
    pub repo_name: String,
    pub repo_path: String,
    pub commit_hash: String,
    pub port: u16,
    pub workspace_path: String,
    pub started_at: Option<DateTime<Utc>>,
    pub status: InstanceStatus,
    pub error: Option<String>,
    pub adapter: String,
}

struct RunningInstance {
    info: ReplayInstance,
    process: Option<Child>,
}

/// A monotonically increasing port counter, guarded by a mutex, starting at
/// `base_port` (default 9000).
pub struct PortAllocator {
    next: Mutex<u16>,
}

impl PortAllocator {
    pub fn new(base_port: u16) -> Self {
        Self {
            next: Mutex::new(base_port),
        }
    }

    /// If `preferred` is free, use it. Otherwise probe forward from the
    /// counter up to `MAX_PORT_PROBE` ports, returning the first free one
    /// and advancing the counter past it.
    pub fn allocate(&self, preferred: Option<u16>) -> ReplayResult<u16> {
        if let Some(port) = preferred {
            if (MIN_PORT..=MAX_PORT).contains(&port) && port_is_free(port) {
                return Ok(port);
            }
        }

        let mut next = self.next.lock();
        for _ in 0..MAX_PORT_PROBE {
            let candidate = *next;
            *next = next.checked_add(1).unwrap_or(MIN_PORT);
            if candidate < MIN_PORT {
                continue;
            }
            if port_is_free(candidate) {
                return Ok(candidate);
            }
        }

        Err(ReplayError::Internal(
            "exhausted port probe budget without finding a free port".into(),
        ))
    }
}

fn port_is_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Whether a child's captured stdout/stderr reads as an OS-level bind
/// conflict rather than some other startup failure. A port-bind failure
/// is retryable (spec.md §4.7); anything else is terminal.
fn looks_like_bind_conflict(captured_output: &str) -> bool {
    let lower = captured_output.to_ascii_lowercase();
    lower.contains("address already in use")
        || lower.contains("eaddrinuse")
        || (lower.contains("bind") && lower.contains("use"))
}

/// Capture a bounded slice of stdout/stderr from a child that has already
/// exited, for the instance's `error` field (spec.md §4.7).
async fn capture_output(child: &mut Child) -> String {
    use tokio::io::AsyncReadExt;

    async fn read_bounded<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> String {
        let mut buf = vec![0u8; STDOUT_STDERR_CAPTURE_BYTES];
        let n = reader.read(&mut buf).await.unwrap_or(0);
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    let mut combined = String::new();
    if let Some(stdout) = child.stdout.as_mut() {
        combined.push_str(&read_bounded(stdout).await);
    }
    if let Some(stderr) = child.stderr.as_mut() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&read_bounded(stderr).await);
    }
    combined
}

pub struct ReplayOrchestrator {
    adapters: Vec<Box<dyn Adapter>>,
    instances: RwLock<HashMap<String, RunningInstance>>,
    ports: PortAllocator,
    workspaces_root: PathBuf,
}

impl ReplayOrchestrator {
    pub fn new(workspaces_root: PathBuf, base_port: u16, adapters: Vec<Box<dyn Adapter>>) -> Self {
        Self {
            adapters,
            instances: RwLock::new(HashMap::new()),
            ports: PortAllocator::new(base_port),
            workspaces_root,
        }
    }

    /// Workspace path must canonicalize to a descendant of the configured
    /// workspaces root (spec.md §4.7 security preconditions).
    pub fn validate_workspace_containment(&self, workspace: &Path) -> ReplayResult<()> {
        let canonical_root = std::fs::canonicalize(&self.workspaces_root)
            .map_err(|e| ReplayError::Internal(format!("workspaces root unavailable: {e}")))?;
        let canonical_workspace = std::fs::canonicalize(workspace)
            .map_err(|e| ReplayError::Internal(format!("workspace unavailable: {e}")))?;
        if !canonical_workspace.starts_with(&canonical_root) {
            return Err(ReplayError::BadInput(
                "workspace path escapes the workspaces root".into(),
            ));
        }
        Ok(())
    }

    fn instance_key(repo_id: i64, commit_hash: &str) -> String {
        format!("{repo_id}:{commit_hash}")
    }

    /// Start (or idempotently return/restart) an instance for
    /// `(repo_id, commit_hash)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        &self,
        repo_id: i64,
        repo_name: &str,
        repo_path: &str,
        commit_hash: &str,
        workspace: &Path,
        env: HashMap<String, String>,
        preferred_port: Option<u16>,
    ) -> ReplayResult<ReplayInstance> {
        if !commit_hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ReplayError::BadInput(format!(
                "commit hash must be alphanumeric: {commit_hash}"
            )));
        }
        self.validate_workspace_containment(workspace)?;

        let key = Self::instance_key(repo_id, commit_hash);

        let mut effective_preferred = preferred_port;
        {
            let instances = self.instances.read().await;
            if let Some(existing) = instances.get(&key) {
                if existing.info.status == InstanceStatus::Running {
                    return Ok(existing.info.clone());
                }
                // Not running: reuse its id (already the key) and port.
                effective_preferred = Some(existing.info.port);
            }
        }

        let adapter = select_adapter(&self.adapters, workspace)
            .map_err(ReplayError::Internal)?;

        let mut last_error = String::new();
        let mut attempt_preferred = effective_preferred;

        for attempt in 1..=MAX_START_ATTEMPTS {
            let port = self.ports.allocate(attempt_preferred)?;
            if !(MIN_PORT..=MAX_PORT).contains(&port) {
                return Err(ReplayError::BadInput(format!("invalid port: {port}")));
            }

            match adapter.start(workspace, port, &env).await {
                Ok(mut child) => {
                    tokio::time::sleep(LIVENESS_PROBE_DELAY).await;

                    let exited = child.try_wait().map_err(|e| {
                        ReplayError::Internal(format!("failed to probe child liveness: {e}"))
                    })?;

                    if exited.is_some() {
                        let captured = capture_output(&mut child).await;
                        last_error = format!(
                            "child process exited immediately after spawn: {captured}"
                        );

                        if looks_like_bind_conflict(&captured) {
                            // Retryable: the port this attempt chose was taken out
                            // from under it between probe and bind.
                            attempt_preferred = None;
                            if attempt < MAX_START_ATTEMPTS {
                                let backoff_ms = 100u64 * 2u64.pow(attempt - 1);
                                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                            }
                            continue;
                        }

                        // Terminal: the process itself failed, not the bind.
                        break;
                    }

                    let info = ReplayInstance {
                        id: key.clone(),
                        repo_id,
                        repo_name: repo_name.to_string(),
                        repo_path: repo_path.to_string(),
                        commit_hash: commit_hash.to_string(),
                        port,
                        workspace_path: workspace.display().to_string(),
                        started_at: Some(Utc::now()),
                        status: InstanceStatus::Running,
                        error: None,
                        adapter: adapter.name().to_string(),
                    };

                    let mut instances = self.instances.write().await;
                    instances.insert(
                        key,
                        RunningInstance {
                            info: info.clone(),
                            process: Some(child),
                        },
                    );
                    return Ok(info);
                }
                Err(e) => {
                    last_error = e.to_string();
                    // Attempts 2 and 3 ignore any caller-supplied preferred port.
                    attempt_preferred = None;
                    if attempt < MAX_START_ATTEMPTS {
                        let backoff_ms = 100u64 * 2u64.pow(attempt - 1);
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        let failed = ReplayInstance {
            id: key.clone(),
            repo_id,
            repo_name: repo_name.to_string(),
            repo_path: repo_path.to_string(),
            commit_hash: commit_hash.to_string(),
            port: 0,
            workspace_path: workspace.display().to_string(),
            started_at: None,
            status: InstanceStatus::Failed,
            error: Some(last_error.clone()),
            adapter: adapter.name().to_string(),
        };
        let mut instances = self.instances.write().await;
        instances.insert(
            key,
            RunningInstance {
                info: failed.clone(),
                process: None,
            },
        );
        Err(ReplayError::Internal(last_error))
    }

    pub async fn get(&self, id: &str) -> Option<ReplayInstance> {
        self.instances.read().await.get(id).map(|r| r.info.clone())
    }

    pub async fn list(&self) -> Vec<ReplayInstance> {
        self.instances.read().await.values().map(|r| r.info.clone()).collect()
    }

    /// Send a termination signal, wait up to 5 seconds, then force-kill.
    pub async fn stop(&self, id: &str) -> ReplayResult<()> {
        let mut instances = self.instances.write().await;
        let Some(running) = instances.get_mut(id) else {
            return Err(ReplayError::NotFound(format!("no instance with id {id}")));
        };

        if let Some(child) = running.process.as_mut() {
            #[cfg(unix)]
            {
                if let Some(pid) = child.id() {
                    unsafe {
                        libc::kill(pid as i32, libc::SIGTERM);
                    }
                }
            }

            let waited = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, child.wait()).await;
            if waited.is_err() {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }

        running.process = None;
        running.info.status = InstanceStatus::Stopped;
        Ok(())
    }

    /// Iterate a snapshot of ids, stopping each in turn.
    pub async fn stop_all(&self) -> Vec<(String, ReplayResult<()>)> {
        let ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.stop(&id).await;
            results.push((id, result));
        }
        results
    }

    /// Permitted only from `Failed` or `Stopped`.
    pub async fn remove(&self, id: &str) -> ReplayResult<()> {
        let mut instances = self.instances.write().await;
        match instances.get(id) {
            Some(running)
                if running.info.status == InstanceStatus::Failed
                    || running.info.status == InstanceStatus::Stopped =>
            {
                instances.remove(id);
                Ok(())
            }
            Some(_) => Err(ReplayError::Conflict(
                "instance must be stopped or failed before removal".into(),
            )),
            None => Err(ReplayError::NotFound(format!("no instance with id {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_allocator_uses_preferred_port_when_free() {
        let allocator = PortAllocator::new(9000);
        let port = allocator.allocate(Some(19321)).unwrap();
        assert_eq!(port, 19321);
    }

    #[test]
    fn port_allocator_advances_counter_on_fallback() {
        let allocator = PortAllocator::new(9500);
        let first = allocator.allocate(None).unwrap();
        let second = allocator.allocate(None).unwrap();
        assert!(second >= first);
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn workspace_containment_rejects_escape() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let orchestrator =
            ReplayOrchestrator::new(root.path().to_path_buf(), 9000, vec![]);
        let result = orchestrator.validate_workspace_containment(outside.path());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn commit_hash_must_be_alphanumeric() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator =
            ReplayOrchestrator::new(root.path().to_path_buf(), 9000, vec![]);
        let result = orchestrator
            .start(1, "demo", "/tmp/demo", "abc; rm -rf /", root.path(), HashMap::new(), None)
            .await;
        assert!(matches!(result, Err(ReplayError::BadInput(_))));
    }

    #[tokio::test]
    async fn remove_rejected_while_running() {
        use crate::adapter::StaticHtmlAdapter;
        let root = tempfile::tempdir().unwrap();
        let workspace = root.path().join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("index.html"), "<html></html>").unwrap();

        let orchestrator = ReplayOrchestrator::new(
            root.path().to_path_buf(),
            19400,
            vec![Box::new(StaticHtmlAdapter)],
        );

        // Manually seed a "running" instance without actually spawning, to
        // exercise the remove-guard without depending on process spawn in CI.
        let key = ReplayOrchestrator::instance_key(1, "abc1234");
        {
            let mut instances = orchestrator.instances.write().await;
            instances.insert(
                key.clone(),
                RunningInstance {
                    info: ReplayInstance {
                        id: key.clone(),
                        repo_id: 1,
                        repo_name: "demo".into(),
                        repo_path: "/tmp/demo".into(),
                        commit_hash: "abc1234".into(),
                        port: 19400,
                        workspace_path: workspace.display().to_string(),
                        started_at: Some(Utc::now()),
                        status: InstanceStatus::Running,
                        error: None,
                        adapter: "static-html".into(),
                    },
                    process: None,
                },
            );
        }

        let result = orchestrator.remove(&key).await;
        assert!(matches!(result, Err(ReplayError::Conflict(_))));
    }

    /// A minimal adapter for exercising orchestrator lifecycle logic
    /// without re-exec'ing the current (test) binary the way
    /// `StaticHtmlAdapter` does.
    struct SleepAdapter;

    #[async_trait::async_trait]
    impl Adapter for SleepAdapter {
        fn name(&self) -> &'static str {
            "sleep"
        }

        fn validate(&self, _workspace: &Path) -> bool {
            true
        }

        async fn start(
            &self,
            _workspace: &Path,
            _port: u16,
            _env: &HashMap<String, String>,
        ) -> ReplayResult<Child> {
            tokio::process::Command::new("sleep")
                .arg("5")
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .map_err(|e| ReplayError::Internal(e.to_string()))
        }
    }

    #[tokio::test]
    async fn restart_reuses_prior_port() {
        let root = tempfile::tempdir().unwrap();
        let workspace = root.path().join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("index.html"), "<html></html>").unwrap();

        let orchestrator = ReplayOrchestrator::new(
            root.path().to_path_buf(),
            19500,
            vec![Box::new(SleepAdapter)],
        );

        let prior_port = 19531u16;
        let key = ReplayOrchestrator::instance_key(1, "abc1234");
        {
            let mut instances = orchestrator.instances.write().await;
            instances.insert(
                key.clone(),
                RunningInstance {
                    info: ReplayInstance {
                        id: key.clone(),
                        repo_id: 1,
                        repo_name: "demo".into(),
                        repo_path: "/tmp/demo".into(),
                        commit_hash: "abc1234".into(),
                        port: prior_port,
                        workspace_path: workspace.display().to_string(),
                        started_at: Some(Utc::now()),
                        status: InstanceStatus::Stopped,
                        error: None,
                        adapter: "static-html".into(),
                    },
                    process: None,
                },
            );
        }

        let instance = orchestrator
            .start(
                1,
                "demo",
                "/tmp/demo",
                "abc1234",
                &workspace,
                HashMap::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(instance.port, prior_port);
        assert_eq!(instance.status, InstanceStatus::Running);
    }

    #[test]
    fn bind_conflict_is_recognized_in_captured_output() {
        assert!(looks_like_bind_conflict(
            "Error: binding 127.0.0.1:9000\n\nCaused by:\n    0: Address already in use (os error 98)"
        ));
        assert!(looks_like_bind_conflict("thread panicked: EADDRINUSE"));
        assert!(!looks_like_bind_conflict("thread panicked: index out of bounds"));
        assert!(!looks_like_bind_conflict(""));
    }

    /// Spawns a child that prints a bind-conflict message and exits
    /// immediately on its first invocation, then behaves like
    /// `SleepAdapter` on every later invocation — exercising the
    /// "port-bind failure is retryable" branch of the startup loop.
    struct FlakyBindAdapter {
        attempts: std::sync::atomic::AtomicUsize,
    }

    impl FlakyBindAdapter {
        fn new() -> Self {
            Self {
                attempts: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Adapter for FlakyBindAdapter {
        fn name(&self) -> &'static str {
            "flaky-bind"
        }

        fn validate(&self, _workspace: &Path) -> bool {
            true
        }

        async fn start(
            &self,
            _workspace: &Path,
            _port: u16,
            _env: &HashMap<String, String>,
        ) -> ReplayResult<Child> {
            let attempt = self
                .attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

            if attempt == 0 {
                tokio::process::Command::new("sh")
                    .arg("-c")
                    .arg("echo 'Error: Address already in use (os error 98)' >&2; exit 1")
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::piped())
                    .spawn()
                    .map_err(|e| ReplayError::Internal(e.to_string()))
            } else {
                tokio::process::Command::new("sleep")
                    .arg("5")
                    .stdout(std::process::Stdio::piped())
                    .stderr(std::process::Stdio::piped())
                    .spawn()
                    .map_err(|e| ReplayError::Internal(e.to_string()))
            }
        }
    }

    #[tokio::test]
    async fn immediate_exit_from_bind_conflict_is_retried() {
        let root = tempfile::tempdir().unwrap();
        let workspace = root.path().join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("index.html"), "<html></html>").unwrap();

        let orchestrator = ReplayOrchestrator::new(
            root.path().to_path_buf(),
            19600,
            vec![Box::new(FlakyBindAdapter::new())],
        );

        let instance = orchestrator
            .start(1, "demo", "/tmp/demo", "abc1234", &workspace, HashMap::new(), None)
            .await
            .unwrap();

        assert_eq!(instance.status, InstanceStatus::Running);
    }
}
