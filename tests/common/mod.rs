#![allow(dead_code)]

use git2::{Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use vgit::ViewConfig;
use vgit::git::{NoticeReceiver, StatusView, notice_channel};
use vgit::shared_state::CommandLog;

pub fn create_test_repo() -> (TempDir, Repository) {
    let temp_dir = TempDir::new().unwrap();
    let repo = Repository::init(temp_dir.path()).unwrap();

    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();
    config.set_bool("commit.gpgsign", false).unwrap();

    (temp_dir, repo)
}

pub fn write_file(repo_path: &Path, name: &str, content: &str) {
    let path = repo_path.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn stage_file(repo: &Repository, name: &str) {
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
}

pub fn create_commit(repo: &Repository, files: &[(&str, &str)], message: &str) -> git2::Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (name, content) in files {
        write_file(&workdir, name, content);
        index.add_path(Path::new(name)).unwrap();
    }
    index.write().unwrap();

    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let signature = Signature::now("Test User", "test@example.com").unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parents,
    )
    .unwrap()
}

pub fn current_branch(repo: &Repository) -> String {
    repo.head().unwrap().shorthand().unwrap().to_string()
}

pub fn open_view(
    path: &Path,
    config: ViewConfig,
) -> (Arc<StatusView>, NoticeReceiver, Arc<CommandLog>) {
    let log = Arc::new(CommandLog::new());
    let (tx, rx) = notice_channel();
    let view = StatusView::open(path, config, Arc::clone(&log), tx).unwrap();
    (view, rx, log)
}

pub fn drain(rx: &mut NoticeReceiver) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice.to_string());
    }
    out
}

pub fn row_names(view: &StatusView) -> Vec<String> {
    view.snapshot().row_names()
}

/// A `git` wrapper script that runs `status_script` in place of `git status`
/// and hands every other subcommand to the real git.
///
/// The runner always passes `--no-pager --git-dir <dir> --work-tree <dir>`
/// first, so the subcommand is the sixth argument.
#[cfg(unix)]
pub fn fake_git(dir: &Path, status_script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("git");
    let script = format!(
        "#!/bin/sh\ncase \"$6\" in\n  status)\n    {status_script}\n    ;;\n  *) exec git \"$@\" ;;\nesac\n"
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
