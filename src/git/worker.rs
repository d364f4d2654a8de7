use super::branch::{BRANCH_FORMAT, BranchDeltas};
use super::runner::{GitRunner, GitStream, Notice, NoticeSender};
use super::status::{NumstatEvent, NumstatParser, StatusCache, StatusParser, order_rows};
use super::stream::NUL;
use super::types::{DiffSide, FileEntry, FileStatus, StatusCode, StatusSnapshot, relative_name};
use crate::config::ViewConfig;
use crate::error::GitError;
use crate::shared_state::{CommandLog, ViewSharedState};
use color_eyre::eyre::Result;
use log::{debug, info, trace};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

const NO_BRANCH: &str = "no branch";

/// A live status listing of one directory of a worktree.
///
/// Readers see the last published [`StatusSnapshot`]. Each reload builds a
/// fresh snapshot from scratch and swaps it in only once every query has run,
/// so a reader never sees two cycles mixed together.
pub struct StatusView {
    name: String,
    /// Directory this view lists
    dir: PathBuf,
    /// Worktree root, shared with the parent view
    root: PathBuf,
    runner: GitRunner,
    config: ViewConfig,
    parent: Option<Weak<StatusView>>,
    state: Arc<ViewSharedState>,
    force_pending: AtomicBool,
}

impl StatusView {
    /// Open a root view on the worktree at `root`.
    pub fn open(
        root: impl Into<PathBuf>,
        config: ViewConfig,
        log: Arc<CommandLog>,
        notices: NoticeSender,
    ) -> Result<Arc<Self>> {
        let root = root.into();
        if !root.join(".git").exists() {
            return Err(GitError::NoRepository { path: root }.into());
        }

        let name = view_name(&root);
        let runner = GitRunner::new(&root, log, notices)
            .with_git_binary(&config.git_binary)
            .with_logfile(config.logfile.clone())
            .for_view(&name);

        info!("Opened status view {name} on {root:?}");
        Ok(Arc::new(Self {
            name,
            dir: root.clone(),
            root,
            runner,
            config,
            parent: None,
            state: Arc::new(ViewSharedState::new()),
            force_pending: AtomicBool::new(false),
        }))
    }

    /// Open a child view listing the directory `entry`.
    ///
    /// The child shares this view's repository, runner and notices, but owns
    /// its own status map and rows.
    pub fn child(self: &Arc<Self>, entry: &FileEntry) -> Arc<Self> {
        let name = view_name(&entry.path);
        debug!("Opening child view {name} under {}", self.name);
        Arc::new(Self {
            runner: self.runner.for_view(&name),
            name,
            dir: entry.path.clone(),
            root: self.root.clone(),
            config: self.config.clone(),
            parent: Some(Arc::downgrade(self)),
            state: Arc::new(ViewSharedState::new()),
            force_pending: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> &Path {
        self.runner.git_dir()
    }

    pub fn runner(&self) -> &GitRunner {
        &self.runner
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn shared_state(&self) -> &Arc<ViewSharedState> {
        &self.state
    }

    pub fn parent(&self) -> Option<Arc<StatusView>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// The outermost view still alive above this one.
    pub fn root_view(self: &Arc<Self>) -> Arc<StatusView> {
        let mut view = Arc::clone(self);
        while let Some(parent) = view.parent() {
            view = parent;
        }
        view
    }

    pub fn notify(&self, notice: Notice) {
        self.runner.notify(notice);
    }

    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        self.state.get_snapshot()
    }

    pub fn rows(&self) -> Vec<FileEntry> {
        self.snapshot().rows.clone()
    }

    pub fn status_of(&self, entry: &FileEntry) -> FileStatus {
        self.snapshot().status_of(&entry.filename)
    }

    /// Arm `--force` for the next mutating command only.
    pub fn force_next(&self) {
        self.force_pending.store(true, Ordering::SeqCst);
        self.notify(Notice::Status("--force next git command".to_string()));
    }

    /// Extra arguments armed for the next mutating command, disarming them.
    pub fn take_pending_args(&self) -> Vec<String> {
        if self.force_pending.swap(false, Ordering::SeqCst) {
            vec!["--force".to_string()]
        } else {
            Vec::new()
        }
    }

    /// Run one full reload cycle and publish its snapshot.
    ///
    /// Returns false when a newer cycle started meanwhile and this one's
    /// result was discarded.
    pub async fn reload(&self) -> bool {
        let cycle = self.state.begin_cycle();
        debug!("Reload cycle {cycle} starting for {}", self.name);

        let snapshot = self.build_snapshot(cycle).await;
        let rows = snapshot.rows.len();

        if self.state.publish(snapshot) {
            trace!("Reload cycle {cycle} for {} published {rows} rows", self.name);
            true
        } else {
            debug!(
                "Discarding stale reload cycle {cycle} for {} (latest {})",
                self.name,
                self.state.latest_cycle()
            );
            false
        }
    }

    /// Reload in the background.
    pub fn spawn_reload(self: &Arc<Self>) -> JoinHandle<bool> {
        let view = Arc::clone(self);
        tokio::spawn(async move { view.reload().await })
    }

    async fn build_snapshot(&self, cycle: u64) -> StatusSnapshot {
        let show_ignored = self.config.show_ignored;
        let dir_prefix = relative_name(&self.dir, &self.root);

        let candidates = self.list_directory().await;

        let branch = self
            .runner
            .all(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .stdout
            .trim()
            .to_string();
        let branches = self.branch_deltas().await;
        let remote_delta = branches
            .get(&branch)
            .map(str::to_string)
            .unwrap_or_else(|| NO_BRANCH.to_string());

        let mut cache = StatusCache::new();
        let mut rows = Vec::new();
        let mut materialized = HashSet::new();

        let mut tracked = self.runner.chunks(&["ls-files", "-z"], NUL);
        while let Some(path) = tracked.next().await {
            if !path.is_empty() {
                cache.seed_tracked(&path);
            }
        }
        self.track_error("ls-files", tracked.succeeded(), tracked.command());

        let mut parser = StatusParser::new();
        let mut status = self
            .runner
            .chunks(&["status", "-z", "-unormal", "--ignored"], NUL);
        while let Some(chunk) = status.next().await {
            let Some(line) = parser.push(&chunk) else {
                continue;
            };
            if line.code == StatusCode::Malformed {
                self.notify(Notice::Unmatched {
                    what: "status",
                    text: chunk.clone(),
                });
            }
            cache.record_status(line.path, line.code);

            let entry = FileEntry::new(self.root.join(line.path), &self.root);
            if !candidates.contains_key(&entry.filename)
                && entry.is_within(&dir_prefix)
                && !cache.is_ignored(&entry.filename, show_ignored)
                && materialized.insert(entry.filename.clone())
            {
                rows.push(entry);
            }
        }
        self.track_error("status", status.succeeded(), status.command());

        self.merge_numstat(&mut cache, DiffSide::Unstaged, &["diff-files", "--numstat", "-z"])
            .await;
        self.merge_numstat(
            &mut cache,
            DiffSide::Staged,
            &["diff-index", "--cached", "--numstat", "-z", "HEAD"],
        )
        .await;

        for (filename, entry) in candidates {
            if !materialized.contains(&filename) && !cache.is_ignored(&filename, show_ignored) {
                materialized.insert(filename);
                rows.push(entry);
            }
        }

        let statuses = cache.into_inner();
        order_rows(&mut rows, &statuses);

        StatusSnapshot {
            cycle,
            rows,
            statuses,
            branch,
            remote_delta,
            branches: branches.deltas,
        }
    }

    async fn list_directory(&self) -> BTreeMap<String, FileEntry> {
        let mut files = BTreeMap::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Could not list {:?}: {e}", self.dir);
                self.notify(Notice::Error(GitError::Io(e)));
                return files;
            }
        };

        loop {
            match entries.next_entry().await {
                Ok(Some(dirent)) => {
                    if dirent.file_name() == ".git" {
                        continue;
                    }
                    let entry = FileEntry::new(dirent.path(), &self.root);
                    files.insert(entry.filename.clone(), entry);
                }
                Ok(None) => break,
                Err(e) => {
                    self.notify(Notice::Error(GitError::Io(e)));
                    break;
                }
            }
        }
        files
    }

    async fn branch_deltas(&self) -> BranchDeltas {
        let mut deltas = BranchDeltas::default();
        let mut lines = self
            .runner
            .lines(&["for-each-ref", BRANCH_FORMAT, "refs/heads"]);
        while let Some(line) = lines.next().await {
            deltas.push_line(&line);
        }
        for line in &deltas.unmatched {
            self.notify(Notice::Unmatched {
                what: "branch status",
                text: line.clone(),
            });
        }
        self.track_error("for-each-ref", lines.succeeded(), lines.command());
        deltas
    }

    async fn merge_numstat(&self, cache: &mut StatusCache, side: DiffSide, args: &[&str]) {
        let mut parser = NumstatParser::new();
        let mut stream = self.runner.chunks(args, NUL);
        while let Some(chunk) = stream.next().await {
            match parser.push(&chunk) {
                NumstatEvent::Stat(stat) => cache.record_numstat(side, &stat),
                NumstatEvent::Mismatch(text) => self.notify(Notice::Unmatched {
                    what: "numstat",
                    text,
                }),
                NumstatEvent::Pending | NumstatEvent::Skip => {}
            }
        }
        self.track_error(args[0], stream.succeeded(), stream.command());
    }

    fn track_error(&self, key: &str, succeeded: bool, command: &str) {
        if succeeded {
            self.state.clear_error(key);
        } else {
            self.state
                .set_error(key.to_string(), format!("{command} failed"));
        }
    }

    /// Run a repository-modifying command, then reload the parent view (if
    /// any) and this one. Armed extra arguments are appended and consumed.
    ///
    /// Returns whether git exited successfully; the reloads happen either way.
    pub async fn git<S: AsRef<str>>(&self, args: &[S]) -> bool {
        let mut args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        args.extend(self.take_pending_args());
        let stream = self.runner.lines(&args);
        self.finish_mutation(stream).await
    }

    /// Run a mutating command in the background.
    pub fn spawn_git(self: &Arc<Self>, args: Vec<String>) -> JoinHandle<bool> {
        let view = Arc::clone(self);
        tokio::spawn(async move { view.git(&args).await })
    }

    pub(crate) async fn finish_mutation(&self, mut stream: GitStream) -> bool {
        while let Some(line) = stream.next().await {
            self.notify(Notice::Status(line));
        }
        let succeeded = stream.succeeded();

        self.reload_after_mutation().await;
        succeeded
    }

    /// Parent first, so a child is never staler than its parent.
    pub async fn reload_after_mutation(&self) {
        if let Some(parent) = self.parent() {
            parent.reload().await;
        }
        self.reload().await;
    }

    /// `[<operation>] ‹<branch><delta>› ` for the view header.
    pub fn status_line(self: &Arc<Self>) -> String {
        let mut line = match self.in_progress() {
            Some(op) => format!("[{op}] "),
            None => String::new(),
        };

        let root = self.root_view().snapshot();
        if root.cycle > 0 {
            line.push_str(&format!("‹{}{}› ", root.branch, root.remote_delta));
        }
        line
    }
}

/// Last two components of `path`, joined with `/`.
fn view_name(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let start = parts.len().saturating_sub(2);
    parts[start..].join("/").trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::runner::notice_channel;

    #[test]
    fn test_view_name() {
        assert_eq!(view_name(Path::new("/home/me/projects/vgit")), "projects/vgit");
        assert_eq!(view_name(Path::new("/repo")), "repo");
    }

    #[test]
    fn test_open_requires_git_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, _rx) = notice_channel();
        let result = StatusView::open(
            dir.path(),
            ViewConfig::default(),
            Arc::new(CommandLog::new()),
            tx,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_force_flag_is_one_shot() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let (tx, mut rx) = notice_channel();
        let view = StatusView::open(
            dir.path(),
            ViewConfig::default(),
            Arc::new(CommandLog::new()),
            tx,
        )
        .unwrap();

        assert!(view.take_pending_args().is_empty());
        view.force_next();
        assert_eq!(view.take_pending_args(), vec!["--force"]);
        assert!(view.take_pending_args().is_empty());
        assert_eq!(rx.try_recv().unwrap().to_string(), "--force next git command");
    }

    #[test]
    fn test_child_view_keeps_parent_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let (tx, _rx) = notice_channel();
        let view = StatusView::open(
            dir.path(),
            ViewConfig::default(),
            Arc::new(CommandLog::new()),
            tx,
        )
        .unwrap();

        let entry = FileEntry::new(dir.path().join("src"), dir.path());
        let child = view.child(&entry);
        assert_eq!(child.root(), view.root());
        assert_eq!(child.dir(), dir.path().join("src"));
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &view));
        assert!(Arc::ptr_eq(&child.root_view(), &view));

        drop(view);
        assert!(child.parent().is_none());
    }
}
