//! Invoking git against one worktree.
//!
//! Every invocation pins `--git-dir` and `--work-tree`, so it targets the
//! view's repository no matter where the process runs. Output comes back in one
//! of three shapes: fully buffered ([`GitRunner::all`]), line by line
//! ([`GitRunner::lines`]) or split on an arbitrary byte ([`GitRunner::chunks`]).
//!
//! Failures are never returned inline with the output. They go to the view's
//! [`Notice`] channel, and whatever output was produced before the failure is
//! still handed to the caller.

use crate::error::GitError;
use crate::shared_state::CommandLog;
use log::{debug, warn};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::stream::{ChunkReader, NEWLINE};

/// Stderr with fewer lines than this is shown as individual notices.
const STDERR_DETAIL_THRESHOLD: usize = 3;

/// Something the user should see that did not stop the engine.
#[derive(Debug)]
pub enum Notice {
    Status(String),
    Error(GitError),
    /// Multi-line stderr worth reading as a whole
    Detail {
        title: String,
        lines: Vec<String>,
    },
    /// A line or chunk of output that did not have the expected shape
    Unmatched {
        what: &'static str,
        text: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Status(text) => f.write_str(text),
            Notice::Error(err) => write!(f, "{err}"),
            Notice::Detail { title, lines } => write!(f, "{title}\n{}", lines.join("\n")),
            Notice::Unmatched { what, text } => write!(f, "unmatched {what}: {text}"),
        }
    }
}

pub type NoticeSender = mpsc::UnboundedSender<Notice>;
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;

pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    mpsc::unbounded_channel()
}

/// Runs git for one worktree on behalf of one view.
#[derive(Clone)]
pub struct GitRunner {
    git: PathBuf,
    git_dir: PathBuf,
    work_tree: PathBuf,
    view: String,
    log: Arc<CommandLog>,
    logfile: Option<PathBuf>,
    notices: NoticeSender,
}

impl GitRunner {
    pub fn new(work_tree: impl Into<PathBuf>, log: Arc<CommandLog>, notices: NoticeSender) -> Self {
        let work_tree = work_tree.into();
        Self {
            git: PathBuf::from("git"),
            git_dir: work_tree.join(".git"),
            work_tree,
            view: String::new(),
            log,
            logfile: None,
            notices,
        }
    }

    pub fn with_git_binary(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    /// Also append every command line to this file.
    pub fn with_logfile(mut self, logfile: Option<PathBuf>) -> Self {
        self.logfile = logfile;
        self
    }

    /// Same repository, attributed to another view in the command log.
    pub fn for_view(&self, view: impl Into<String>) -> Self {
        let mut runner = self.clone();
        runner.view = view.into();
        runner
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn command_log(&self) -> &Arc<CommandLog> {
        &self.log
    }

    pub fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn command_text<S: AsRef<str>>(args: &[S]) -> String {
        let mut text = String::from("git");
        for arg in args {
            text.push(' ');
            text.push_str(arg.as_ref());
        }
        text
    }

    fn command<S: AsRef<str>>(&self, args: &[S]) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.arg("--no-pager")
            .arg("--git-dir")
            .arg(&self.git_dir)
            .arg("--work-tree")
            .arg(&self.work_tree)
            .args(args.iter().map(|a| a.as_ref()))
            .current_dir(&self.work_tree)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn append_logfile(&self, command: &str) {
        let Some(logfile) = &self.logfile else {
            return;
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(logfile)
            .and_then(|mut fp| writeln!(fp, "{command}"));
        if let Err(e) = written {
            warn!("Could not append to git logfile {logfile:?}: {e}");
        }
    }

    fn record(&self, command: &str, output: String) {
        self.log.record(&self.view, command, output);
    }

    /// Apply the stderr policy: a couple of lines become transient notices,
    /// anything longer is surfaced as one block.
    fn report_stderr(&self, command: &str, stderr: &str) {
        let lines: Vec<String> = stderr.lines().map(str::to_string).collect();
        if lines.len() < STDERR_DETAIL_THRESHOLD {
            for line in lines {
                self.notify(Notice::Status(format!("stderr: {line}")));
            }
        } else {
            self.notify(Notice::Detail {
                title: command.to_string(),
                lines,
            });
        }
    }

    /// Run to completion and return everything it printed.
    pub async fn all<S: AsRef<str>>(&self, args: &[S]) -> CommandOutput {
        let command = Self::command_text(args);
        debug!("Running {command}");
        self.append_logfile(&command);

        let output = match self.command(args).output().await {
            Ok(output) => output,
            Err(e) => {
                self.record(&command, String::new());
                self.notify(Notice::Error(GitError::spawn(&command, e)));
                return CommandOutput::failed_to_start(command);
            }
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            command,
        };

        self.record(&result.command, result.combined());
        if !result.success() {
            self.report_stderr(&result.command, &result.stderr);
            self.notify(Notice::Error(GitError::command_failed(
                &result.command,
                result.exit_code,
            )));
        }
        result
    }

    /// Stream stdout line by line, end-of-line markers stripped.
    pub fn lines<S: AsRef<str>>(&self, args: &[S]) -> GitStream {
        self.chunks(args, NEWLINE)
    }

    /// Stream stdout split on `sep`, typically NUL for `-z` output.
    pub fn chunks<S: AsRef<str>>(&self, args: &[S], sep: u8) -> GitStream {
        self.spawn_stream(args, sep, None, FailureKind::Command)
    }

    /// Feed `body` to `git apply -p0 -` followed by `extra_args`.
    pub fn apply_patch<S: AsRef<str>>(&self, body: String, extra_args: &[S]) -> GitStream {
        let mut args = vec!["apply".to_string(), "-p0".to_string(), "-".to_string()];
        args.extend(extra_args.iter().map(|a| a.as_ref().to_string()));
        self.spawn_stream(&args, NEWLINE, Some(body), FailureKind::Patch)
    }

    fn spawn_stream<S: AsRef<str>>(
        &self,
        args: &[S],
        sep: u8,
        input: Option<String>,
        failure: FailureKind,
    ) -> GitStream {
        let command = Self::command_text(args);
        debug!("Streaming {command}");
        self.append_logfile(&command);

        let mut cmd = self.command(args);
        if input.is_some() {
            cmd.stdin(Stdio::piped());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.record(&command, String::new());
                self.notify(Notice::Error(GitError::spawn(&command, e)));
                return GitStream::not_started(self.clone(), command, sep, failure);
            }
        };

        if let (Some(body), Some(mut stdin)) = (input, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(body.as_bytes()).await {
                    debug!("Failed to write git stdin: {e}");
                }
                // dropping stdin closes it so git sees EOF
            });
        }

        let stderr = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });
        let reader = child.stdout.take().map(|out| ChunkReader::new(out, sep));

        GitStream {
            runner: self.clone(),
            command,
            sep,
            failure,
            child: Some(child),
            reader,
            stderr,
            captured: String::new(),
            exit_code: None,
            finished: false,
        }
    }
}

/// Result of a fully buffered invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` if the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    fn failed_to_start(command: String) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Command,
    Patch,
}

/// Output of a running git command, consumed one chunk at a time.
///
/// When stdout is exhausted the process is reaped, stderr is reported, and a
/// non-zero exit becomes a [`Notice::Error`]. The sequence itself just ends.
pub struct GitStream {
    runner: GitRunner,
    command: String,
    sep: u8,
    failure: FailureKind,
    child: Option<Child>,
    reader: Option<ChunkReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    captured: String,
    exit_code: Option<i32>,
    finished: bool,
}

impl GitStream {
    fn not_started(runner: GitRunner, command: String, sep: u8, failure: FailureKind) -> Self {
        Self {
            runner,
            command,
            sep,
            failure,
            child: None,
            reader: None,
            stderr: None,
            captured: String::new(),
            exit_code: None,
            finished: true,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Next chunk of output, or `None` once the command has finished.
    pub async fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        let next = match self.reader.as_mut() {
            Some(reader) => reader.next_chunk().await,
            None => Ok(None),
        };

        match next {
            Ok(Some(chunk)) => {
                // capture no more than the command log keeps
                if self.captured.len() <= self.runner.log.max_output() {
                    self.captured.push_str(&chunk);
                    self.captured.push(char::from(self.sep));
                }
                Some(chunk)
            }
            Ok(None) => {
                self.finish().await;
                None
            }
            Err(e) => {
                self.runner.notify(Notice::Error(GitError::Io(e)));
                self.finish().await;
                None
            }
        }
    }

    /// Drain the remaining output.
    pub async fn collect(mut self) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next().await {
            chunks.push(chunk);
        }
        chunks
    }

    /// True once the command has finished with exit status 0.
    pub fn succeeded(&self) -> bool {
        self.finished && self.exit_code == Some(0)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    async fn finish(&mut self) {
        self.finished = true;
        self.reader = None;

        let status = match self.child.take() {
            Some(mut child) => child.wait().await,
            None => return,
        };
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        self.runner.report_stderr(&self.command, &stderr);

        let mut output = std::mem::take(&mut self.captured);
        output.push_str(&stderr);
        self.runner.record(&self.command, output);

        match status {
            Ok(status) => {
                self.exit_code = status.code();
                if !status.success() {
                    let err = match self.failure {
                        FailureKind::Command => {
                            GitError::command_failed(&self.command, self.exit_code)
                        }
                        FailureKind::Patch => GitError::PatchFailed {
                            command: self.command.clone(),
                            exit_code: self.exit_code,
                        },
                    };
                    debug!("{err}");
                    self.runner.notify(Notice::Error(err));
                }
            }
            Err(e) => self.runner.notify(Notice::Error(GitError::Io(e))),
        }
    }
}
