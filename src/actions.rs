//! Named actions a front end can bind to keys.
//!
//! Each action maps to a typed handler taking the current view and the rows
//! and text input the user supplied. Handlers run the mutation and the reload
//! that follows it; failures of git itself arrive through the notice channel.

use crate::git::{FileEntry, Notice, StatusView};
use color_eyre::eyre::{Result, eyre};
use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Add,
    Move,
    Remove,
    Reset,
    Checkout,
    Commit,
    AddSelected,
    RemoveSelected,
    Force,
    Abort,
    IgnoreFile,
    IgnoreWildcard,
    Exec,
}

impl Action {
    pub const ALL: [Action; 13] = [
        Action::Add,
        Action::Move,
        Action::Remove,
        Action::Reset,
        Action::Checkout,
        Action::Commit,
        Action::AddSelected,
        Action::RemoveSelected,
        Action::Force,
        Action::Abort,
        Action::IgnoreFile,
        Action::IgnoreWildcard,
        Action::Exec,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Add => "git-add",
            Action::Move => "git-mv",
            Action::Remove => "git-rm",
            Action::Reset => "git-reset",
            Action::Checkout => "git-checkout",
            Action::Commit => "git-commit",
            Action::AddSelected => "git-add-selected",
            Action::RemoveSelected => "git-rm-selected",
            Action::Force => "git-force",
            Action::Abort => "git-abort",
            Action::IgnoreFile => "ignore-file",
            Action::IgnoreWildcard => "ignore-wildcard",
            Action::Exec => "git-exec",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Action::Add => "add this new file or modified file to staging",
            Action::Move => "rename this file",
            Action::Remove => "stage this file for deletion",
            Action::Reset => "reset/unstage this file",
            Action::Checkout => "checkout this file",
            Action::Commit => "commit changes",
            Action::AddSelected => "add all selected files to staging",
            Action::RemoveSelected => "delete all selected files",
            Action::Force => "add --force to next git command",
            Action::Abort => "abort the rebase, merge, cherry-pick or bisect in progress",
            Action::IgnoreFile => "add file to toplevel .gitignore",
            Action::IgnoreWildcard => "add input line to toplevel .gitignore",
            Action::Exec => "run a git command and show its output",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| format!("Unknown action: {s}"))
    }
}

/// What the user pointed at when invoking an action.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs {
    /// Cursor row first, or the selected rows for the `-selected` actions
    pub rows: Vec<FileEntry>,
    /// Text typed at the action's prompt, if it has one
    pub input: Option<String>,
}

impl ActionArgs {
    pub fn row(entry: FileEntry) -> Self {
        Self {
            rows: vec![entry],
            input: None,
        }
    }

    pub fn rows(rows: Vec<FileEntry>) -> Self {
        Self { rows, input: None }
    }

    pub fn input(text: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            input: Some(text.into()),
        }
    }

    pub fn with_input(mut self, text: impl Into<String>) -> Self {
        self.input = Some(text.into());
        self
    }

    fn cursor(&self, action: Action) -> Result<&FileEntry> {
        self.rows
            .first()
            .ok_or_else(|| eyre!("{action} needs a row"))
    }

    fn text(&self, action: Action) -> Result<&str> {
        self.input
            .as_deref()
            .filter(|text| !text.is_empty())
            .ok_or_else(|| eyre!("{action} needs input"))
    }

    fn filenames(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.filename.clone()).collect()
    }
}

pub type Handler = fn(Arc<StatusView>, ActionArgs) -> BoxFuture<'static, Result<()>>;

fn single_row(
    view: Arc<StatusView>,
    args: ActionArgs,
    action: Action,
    cmd: &'static [&'static str],
) -> BoxFuture<'static, Result<()>> {
    async move {
        let row = args.cursor(action)?;
        let mut argv: Vec<String> = cmd.iter().map(|a| a.to_string()).collect();
        argv.push(row.filename.clone());
        view.git(&argv).await;
        Ok(())
    }
    .boxed()
}

fn selected_rows(
    view: Arc<StatusView>,
    args: ActionArgs,
    action: Action,
    subcommand: &'static str,
) -> BoxFuture<'static, Result<()>> {
    async move {
        if args.rows.is_empty() {
            return Err(eyre!("{action} needs selected rows"));
        }
        let mut argv = vec![subcommand.to_string()];
        argv.extend(args.filenames());
        view.git(&argv).await;
        Ok(())
    }
    .boxed()
}

fn git_add(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    single_row(view, args, Action::Add, &["add"])
}

fn git_rm(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    single_row(view, args, Action::Remove, &["rm"])
}

fn git_reset(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    single_row(view, args, Action::Reset, &["reset", "HEAD"])
}

fn git_checkout(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    single_row(view, args, Action::Checkout, &["checkout"])
}

fn git_add_selected(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    selected_rows(view, args, Action::AddSelected, "add")
}

fn git_rm_selected(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    selected_rows(view, args, Action::RemoveSelected, "rm")
}

fn git_mv(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    async move {
        let row = args.cursor(Action::Move)?;
        let target = args.text(Action::Move)?;
        view.git(&["mv", row.filename.as_str(), target]).await;
        Ok(())
    }
    .boxed()
}

fn git_commit(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    async move {
        let message = args.text(Action::Commit)?;
        view.git(&["commit", "-m", message]).await;
        Ok(())
    }
    .boxed()
}

fn git_force(view: Arc<StatusView>, _args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    async move {
        view.force_next();
        Ok(())
    }
    .boxed()
}

fn git_abort(view: Arc<StatusView>, _args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    async move {
        view.abort_in_progress().await?;
        Ok(())
    }
    .boxed()
}

fn ignore_file(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    async move {
        let row = args.cursor(Action::IgnoreFile)?;
        view.ignore_file(row).await
    }
    .boxed()
}

fn ignore_wildcard(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    async move {
        let pattern = args.text(Action::IgnoreWildcard)?;
        view.ignore_wildcard(pattern).await
    }
    .boxed()
}

fn git_exec(view: Arc<StatusView>, args: ActionArgs) -> BoxFuture<'static, Result<()>> {
    async move {
        let cmdline = args.text(Action::Exec)?;
        let lines = view.git_exec(cmdline).await;
        view.notify(Notice::Detail {
            title: format!("git {cmdline}"),
            lines,
        });
        Ok(())
    }
    .boxed()
}

/// Fixed table from action to handler.
pub struct ActionTable {
    handlers: HashMap<Action, Handler>,
}

impl ActionTable {
    pub fn new() -> Self {
        let mut handlers: HashMap<Action, Handler> = HashMap::new();
        handlers.insert(Action::Add, git_add);
        handlers.insert(Action::Move, git_mv);
        handlers.insert(Action::Remove, git_rm);
        handlers.insert(Action::Reset, git_reset);
        handlers.insert(Action::Checkout, git_checkout);
        handlers.insert(Action::Commit, git_commit);
        handlers.insert(Action::AddSelected, git_add_selected);
        handlers.insert(Action::RemoveSelected, git_rm_selected);
        handlers.insert(Action::Force, git_force);
        handlers.insert(Action::Abort, git_abort);
        handlers.insert(Action::IgnoreFile, ignore_file);
        handlers.insert(Action::IgnoreWildcard, ignore_wildcard);
        handlers.insert(Action::Exec, git_exec);
        Self { handlers }
    }

    pub fn get(&self, action: Action) -> Option<Handler> {
        self.handlers.get(&action).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `action` to completion, including the reload it triggers.
    pub async fn dispatch(
        &self,
        action: Action,
        view: Arc<StatusView>,
        args: ActionArgs,
    ) -> Result<()> {
        let handler = self
            .get(action)
            .ok_or_else(|| eyre!("No handler bound for {action}"))?;
        debug!("Dispatching {action} on {}", view.name());
        handler(view, args).await
    }

    /// Run `action` in the background. Errors become status notices.
    pub fn spawn(
        &self,
        action: Action,
        view: Arc<StatusView>,
        args: ActionArgs,
    ) -> Option<JoinHandle<()>> {
        let handler = self.get(action)?;
        Some(tokio::spawn(async move {
            if let Err(e) = handler(Arc::clone(&view), args).await {
                warn!("{action} failed: {e}");
                view.notify(Notice::Status(e.to_string()));
            }
        }))
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new()
    }
}
