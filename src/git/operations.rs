//! Repository-level operations on a [`StatusView`]: hunk application,
//! in-progress detection and abort, and `.gitignore` edits.

use super::runner::Notice;
use super::types::{FileEntry, Hunk, RepoOperation};
use super::worker::StatusView;
use crate::error::GitError;
use color_eyre::eyre::{Result, eyre};
use git2::Repository;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

const GITIGNORE: &str = ".gitignore";

/// Worktree root of the repository containing `path`.
pub fn discover_worktree(path: &Path) -> Result<PathBuf> {
    debug!("Discovering git repository from {path:?}");

    let repo = Repository::discover(path)
        .map_err(|e| eyre!("Could not discover git repository: {}", e))?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| GitError::NoRepository {
            path: path.to_path_buf(),
        })?
        .to_path_buf();

    debug!("Repository discovered at: {workdir:?}");
    Ok(workdir)
}

impl RepoOperation {
    /// Operation in progress in the repository whose metadata lives at
    /// `git_dir`, judged by its marker files.
    pub fn detect(git_dir: &Path) -> Option<Self> {
        let exists = |marker: &str| git_dir.join(marker).exists();

        if exists("rebase-merge") || exists("rebase-apply/rebasing") {
            Some(RepoOperation::Rebasing)
        } else if exists("rebase-apply") {
            Some(RepoOperation::Applying)
        } else if exists("CHERRY_PICK_HEAD") {
            Some(RepoOperation::CherryPicking)
        } else if exists("MERGE_HEAD") {
            Some(RepoOperation::Merging)
        } else if exists("BISECT_LOG") {
            Some(RepoOperation::Bisecting)
        } else {
            None
        }
    }

    /// Git arguments that back out of this operation.
    pub fn abort_args(&self) -> [&'static str; 2] {
        match self {
            RepoOperation::CherryPicking => ["cherry-pick", "--abort"],
            RepoOperation::Merging => ["merge", "--abort"],
            RepoOperation::Bisecting => ["bisect", "reset"],
            RepoOperation::Rebasing | RepoOperation::Applying => ["rebase", "--abort"],
        }
    }
}

impl StatusView {
    pub fn in_progress(&self) -> Option<RepoOperation> {
        RepoOperation::detect(self.git_dir())
    }

    /// Abort whatever multi-step operation the repository is in the middle of.
    pub async fn abort_in_progress(&self) -> Result<RepoOperation> {
        let Some(op) = self.in_progress() else {
            return Err(GitError::NothingToAbort.into());
        };

        info!("Aborting {op} in {}", self.name());
        self.git(&op.abort_args()).await;
        Ok(op)
    }

    /// Feed one hunk to `git apply -p0 -`, then reload.
    ///
    /// `extra_args` select the target, e.g. `--cached` to stage the hunk or
    /// `--cached --reverse` to unstage it.
    pub async fn apply_hunk<S: AsRef<str>>(&self, hunk: &Hunk, extra_args: &[S]) -> bool {
        let mut args: Vec<String> = extra_args.iter().map(|a| a.as_ref().to_string()).collect();
        args.extend(self.take_pending_args());
        let stream = self.runner().apply_patch(hunk.patch_body(), &args);
        let applied = self.finish_mutation(stream).await;

        if applied {
            let (start, end) = hunk.line_range();
            self.notify(Notice::Status(format!("applied hunk (lines {start}-{end})")));
        } else {
            debug!("Hunk at line {} did not apply", hunk.start);
        }
        applied
    }

    /// Apply a hunk in the background.
    pub fn spawn_apply_hunk(
        self: &Arc<Self>,
        hunk: Hunk,
        extra_args: Vec<String>,
    ) -> JoinHandle<bool> {
        let view = Arc::clone(self);
        tokio::spawn(async move { view.apply_hunk(&hunk, &extra_args).await })
    }

    /// Append `entry`'s path to the top-level `.gitignore`, then reload.
    pub async fn ignore_file(&self, entry: &FileEntry) -> Result<()> {
        self.append_gitignore(&entry.filename).await?;
        self.reload_after_mutation().await;
        Ok(())
    }

    /// Append an arbitrary pattern line to the top-level `.gitignore`, then reload.
    pub async fn ignore_wildcard(&self, pattern: &str) -> Result<()> {
        let pattern = pattern.trim_end_matches('\n');
        if pattern.is_empty() {
            return Ok(());
        }
        self.append_gitignore(pattern).await?;
        self.reload_after_mutation().await;
        Ok(())
    }

    async fn append_gitignore(&self, line: &str) -> Result<()> {
        let path = self.root().join(GITIGNORE);
        debug!("Appending {line:?} to {path:?}");

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(GitError::Io)?;
        file.write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(GitError::Io)?;
        file.flush().await.map_err(GitError::Io)?;
        Ok(())
    }

    /// Run a free-form git command line and return its output lines.
    ///
    /// The command line is split on whitespace; no shell quoting applies.
    /// Nothing is reloaded afterwards.
    pub async fn git_exec(&self, cmdline: &str) -> Vec<String> {
        let args: Vec<&str> = cmdline.split_whitespace().collect();
        if args.is_empty() {
            return Vec::new();
        }
        self.runner().lines(&args).collect().await
    }
}
