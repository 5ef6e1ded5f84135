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

//! The git worktree manager (C7): validates repos, enumerates commits, and
//! materializes a commit into an isolated directory via `git worktree`
//! with a safe-archive fallback.

use chrono::{DateTime, TimeZone, Utc};
use git2::{Repository, WorktreeAddOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ReplayError, ReplayResult};
use crate::safe_archive;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSummary {
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    pub author: String,
    pub author_email: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileTreeEntry {
    File {
        name: String,
        path: String,
        size: u64,
    },
    Directory {
        name: String,
        path: String,
        children: Vec<FileTreeEntry>,
    },
}

pub struct WorktreeManager;

impl WorktreeManager {
    /// Opens the repository and reports success/failure; no side effects.
    pub fn is_valid_repo(path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    /// Newest-first commit list, capped at `limit` (default 1000), run on
    /// a worker thread by the caller via `spawn_blocking`.
    pub fn get_commits(
        repo_path: &Path,
        limit: Option<usize>,
        branch: Option<&str>,
    ) -> ReplayResult<Vec<CommitSummary>> {
        let repo = Repository::open(repo_path)?;
        let mut walker = repo.revwalk()?;
        walker.set_sorting(git2::Sort::TIME)?;

        match branch {
            Some(name) => {
                let reference = repo
                    .resolve_reference_from_short_name(name)
                    .map_err(ReplayError::Git)?;
                let oid = reference.target().ok_or_else(|| {
                    ReplayError::NotFound(format!("branch {name} has no target"))
                })?;
                walker.push(oid)?;
            }
            None => {
                walker.push_head()?;
            }
        }

        let limit = limit.unwrap_or(1000);
        let mut out = Vec::with_capacity(limit.min(256));
        for oid_result in walker.take(limit) {
            let oid = oid_result?;
            let commit = repo.find_commit(oid)?;
            let hash = oid.to_string();
            let short_hash = hash.chars().take(7).collect::<String>();
            let message = commit.summary().unwrap_or("").to_string();
            let author = commit.author();
            let name = author.name().unwrap_or("unknown").to_string();
            let email = author.email().unwrap_or("").to_string();
            let date = Utc
                .timestamp_opt(commit.time().seconds(), 0)
                .single()
                .unwrap_or_else(Utc::now);

            out.push(CommitSummary {
                hash,
                short_hash,
                message,
                author: name,
                author_email: email,
                date,
            });
        }

        Ok(out)
    }

    /// Materialize `commit` into `target_dir`: `worktree add --detach` first,
    /// falling back to safe `git archive` extraction. On total failure,
    /// removes any partial output and reports `internal`.
    pub fn checkout_to_worktree(
        repo_path: &Path,
        commit: &str,
        target_dir: &Path,
    ) -> ReplayResult<()> {
        let repo = Repository::open(repo_path)?;

        if Self::try_worktree_add(repo_path, commit, target_dir).is_ok() {
            return Ok(());
        }
        if target_dir.exists() && target_dir.read_dir().map(|mut d| d.next().is_some()).unwrap_or(false) {
            return Ok(());
        }

        match Self::try_archive_fallback(&repo, commit, target_dir) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = std::fs::remove_dir_all(target_dir);
                Err(ReplayError::Internal(format!(
                    "failed to materialize commit {commit}: {e}"
                )))
            }
        }
    }

    fn try_worktree_add(repo_path: &Path, commit: &str, target_dir: &Path) -> ReplayResult<()> {
        let repo = Repository::open(repo_path)?;
        let oid = git2::Oid::from_str(commit)?;
        let target_commit = repo.find_commit(oid)?;

        let worktree_name = format!("nexus-{}", &commit[..commit.len().min(12)]);
        let mut opts = WorktreeAddOptions::new();
        let reference = repo.reference(
            &format!("refs/heads/{worktree_name}"),
            target_commit.id(),
            true,
            "nexus replay detached checkout",
        )?;
        opts.reference(Some(&reference));

        repo.worktree(&worktree_name, target_dir, Some(&opts))?;
        Ok(())
    }

    fn try_archive_fallback(repo: &Repository, commit: &str, target_dir: &Path) -> ReplayResult<()> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| ReplayError::Internal("repository has no working directory".into()))?;

        let output = Command::new("git")
            .arg("archive")
            .arg(commit)
            .current_dir(workdir)
            .output()
            .map_err(|e| ReplayError::Internal(format!("failed to spawn git archive: {e}")))?;

        if !output.status.success() {
            return Err(ReplayError::Internal(format!(
                "git archive exited with {}",
                output.status
            )));
        }

        safe_archive::extract_safe(&output.stdout[..], target_dir)
    }

    /// `worktree remove --force`, falling back to a recursive delete.
    pub fn remove_worktree(repo_path: &Path, target_dir: &Path) -> ReplayResult<()> {
        let repo = Repository::open(repo_path);
        if let Ok(repo) = repo {
            if let Ok(worktrees) = repo.worktrees() {
                for name in worktrees.iter().flatten() {
                    if let Ok(wt) = repo.find_worktree(name) {
                        if wt.path() == target_dir {
                            let mut prune_opts = git2::WorktreePruneOptions::new();
                            prune_opts.working_tree(true);
                            let _ = wt.prune(Some(&mut prune_opts));
                        }
                    }
                }
            }
        }

        if target_dir.exists() {
            std::fs::remove_dir_all(target_dir)?;
        }
        Ok(())
    }

    /// Walk the tree at `commit` (falling back to HEAD), ordered directories
    /// before files, then case-insensitive lexicographic by name.
    pub fn get_file_tree(repo_path: &Path, commit: &str) -> ReplayResult<Vec<FileTreeEntry>> {
        let repo = Repository::open(repo_path)?;
        let tree = Self::resolve_tree(&repo, commit)?;
        Self::build_tree_entries(&repo, &tree, "")
    }

    fn resolve_tree<'r>(repo: &'r Repository, commit: &str) -> ReplayResult<git2::Tree<'r>> {
        let oid = git2::Oid::from_str(commit)
            .or_else(|_| repo.revparse_single(commit).map(|o| o.id()))
            .or_else(|_| repo.head().and_then(|h| h.peel_to_commit()).map(|c| c.id()))?;
        let commit_obj = repo.find_commit(oid).or_else(|_| {
            repo.head()
                .and_then(|h| h.peel_to_commit())
        })?;
        Ok(commit_obj.tree()?)
    }

    fn build_tree_entries(
        repo: &Repository,
        tree: &git2::Tree,
        prefix: &str,
    ) -> ReplayResult<Vec<FileTreeEntry>> {
        let mut entries = Vec::new();
        for entry in tree.iter() {
            let name = entry.name().unwrap_or("").to_string();
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };

            match entry.kind() {
                Some(git2::ObjectType::Tree) => {
                    let subtree = entry.to_object(repo)?.peel_to_tree()?;
                    let children = Self::build_tree_entries(repo, &subtree, &path)?;
                    entries.push(FileTreeEntry::Directory {
                        name,
                        path,
                        children,
                    });
                }
                _ => {
                    let size = entry
                        .to_object(repo)
                        .ok()
                        .and_then(|o| o.as_blob().map(|b| b.size() as u64))
                        .unwrap_or(0);
                    entries.push(FileTreeEntry::File { name, path, size });
                }
            }
        }

        entries.sort_by(|a, b| {
            let (a_is_dir, a_name) = sort_key(a);
            let (b_is_dir, b_name) = sort_key(b);
            b_is_dir
                .cmp(&a_is_dir)
                .then_with(|| a_name.to_lowercase().cmp(&b_name.to_lowercase()))
        });

        Ok(entries)
    }

    /// Read the blob at `file_path` within `commit`, decoding as UTF-8 with
    /// lossy replacement on invalid bytes.
    pub fn get_file_content(repo_path: &Path, commit: &str, file_path: &str) -> ReplayResult<String> {
        let repo = Repository::open(repo_path)?;
        let tree = Self::resolve_tree(&repo, commit)?;
        let entry = tree
            .get_path(Path::new(file_path))
            .map_err(|_| ReplayError::NotFound(format!("file not found: {file_path}")))?;
        let blob = entry
            .to_object(&repo)?
            .into_blob()
            .map_err(|_| ReplayError::NotFound(format!("not a file: {file_path}")))?;
        Ok(String::from_utf8_lossy(blob.content()).into_owned())
    }
}

fn sort_key(entry: &FileTreeEntry) -> (bool, &str) {
    match entry {
        FileTreeEntry::Directory { name, .. } => (true, name.as_str()),
        FileTreeEntry::File { name, .. } => (false, name.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo_with_commit() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src").join("main.rs"), "fn main() {}").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("index.html")).unwrap();
        index.add_path(Path::new("src/main.rs")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test Author", "test@example.com").unwrap();
        let commit_id = repo
            .commit(Some("HEAD"), &sig, &sig, "initial commit", &tree, &[])
            .unwrap();

        (dir, commit_id.to_string())
    }

    #[test]
    fn is_valid_repo_detects_git_repos() {
        let (dir, _) = init_repo_with_commit();
        assert!(WorktreeManager::is_valid_repo(dir.path()));
        let not_repo = tempfile::tempdir().unwrap();
        assert!(!WorktreeManager::is_valid_repo(not_repo.path()));
    }

    #[test]
    fn get_commits_returns_newest_first() {
        let (dir, commit_hash) = init_repo_with_commit();
        let commits = WorktreeManager::get_commits(dir.path(), None, None).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, commit_hash);
    }

    #[test]
    fn file_tree_orders_directories_before_files() {
        let (dir, commit_hash) = init_repo_with_commit();
        let tree = WorktreeManager::get_file_tree(dir.path(), &commit_hash).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(matches!(tree[0], FileTreeEntry::Directory { .. }));
        assert!(matches!(tree[1], FileTreeEntry::File { .. }));
    }

    #[test]
    fn get_file_content_decodes_utf8() {
        let (dir, commit_hash) = init_repo_with_commit();
        let content = WorktreeManager::get_file_content(dir.path(), &commit_hash, "index.html").unwrap();
        assert_eq!(content, "<html></html>");
    }

    #[test]
    fn get_file_content_reports_not_found_for_missing_path() {
        let (dir, commit_hash) = init_repo_with_commit();
        let result = WorktreeManager::get_file_content(dir.path(), &commit_hash, "missing.txt");
        assert!(matches!(result, Err(ReplayError::NotFound(_))));
    }
}
