// SPDX-License-Identifier: MIT

//! Git worktree management.
//!
//! Worktree mutations serialize per repository; git itself rejects
//! concurrent index updates, so contention is retried with bounded
//! backoff instead of surfacing spurious failures.

use crate::error::OrchestratorError;
use crate::retry::{with_backoff, BackoffPolicy};
use dg_adapters::subprocess::{run_with_timeout, GIT_WORKTREE_TIMEOUT};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

/// Serializes worktree mutations per repository.
pub struct WorktreeManager {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    policy: BackoffPolicy,
}

impl Default for WorktreeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorktreeManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            policy: BackoffPolicy::default(),
        }
    }

    fn repo_lock(&self, repo_root: &Path) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(repo_root.to_path_buf())
                .or_default(),
        )
    }

    async fn git(repo_root: &Path, args: &[&str]) -> Result<String, String> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(repo_root);
        let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree").await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).into_owned())
        }
    }

    /// Lock-contention failures ("index.lock" and friends) are worth a
    /// retry; everything else is a real error.
    fn is_contention(error: &String) -> bool {
        error.contains("index.lock") || error.contains("could not lock")
    }

    /// Create a worktree for `branch` at `path`, branching from
    /// `start_point` when the branch does not exist yet.
    pub async fn add(
        &self,
        repo_root: &Path,
        path: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<PathBuf, OrchestratorError> {
        let lock = self.repo_lock(repo_root);
        let _guard = lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| OrchestratorError::Configuration(e.to_string()))?;
        }

        let path_str = path.display().to_string();
        with_backoff(self.policy, Self::is_contention, || {
            let path_str = path_str.clone();
            async move {
                Self::git(
                    repo_root,
                    &["worktree", "add", "-B", branch, &path_str, start_point],
                )
                .await
            }
        })
        .await
        .map_err(OrchestratorError::Transient)?;

        info!(repo = %repo_root.display(), worktree = %path.display(), branch, "worktree added");
        Ok(path.to_path_buf())
    }

    /// Remove a worktree (best effort on the directory afterwards).
    pub async fn remove(&self, repo_root: &Path, path: &Path) -> Result<(), OrchestratorError> {
        let lock = self.repo_lock(repo_root);
        let _guard = lock.lock().await;

        let path_str = path.display().to_string();
        with_backoff(self.policy, Self::is_contention, || {
            let path_str = path_str.clone();
            async move {
                Self::git(repo_root, &["worktree", "remove", "--force", &path_str]).await
            }
        })
        .await
        .map_err(OrchestratorError::Transient)?;

        if path.exists() {
            let _ = tokio::fs::remove_dir_all(path).await;
        }
        info!(repo = %repo_root.display(), worktree = %path.display(), "worktree removed");
        Ok(())
    }

    /// Prune stale worktree registrations.
    pub async fn prune(&self, repo_root: &Path) -> Result<(), OrchestratorError> {
        let lock = self.repo_lock(repo_root);
        let _guard = lock.lock().await;
        Self::git(repo_root, &["worktree", "prune"])
            .await
            .map_err(OrchestratorError::Transient)?;
        Ok(())
    }

    /// List registered worktree paths.
    pub async fn list(&self, repo_root: &Path) -> Result<Vec<PathBuf>, OrchestratorError> {
        let output = Self::git(repo_root, &["worktree", "list", "--porcelain"])
            .await
            .map_err(OrchestratorError::Transient)?;
        Ok(output
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(PathBuf::from)
            .collect())
    }
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
