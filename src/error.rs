//! Error taxonomy for git invocations.
//!
//! Most of these are not fatal: a failing query during a reload is reported
//! through the view's notice channel and the reload carries on with whatever
//! data it already has.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} error={}", code_text(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("{command} could not apply patch (error={})", code_text(.exit_code))]
    PatchFailed {
        command: String,
        exit_code: Option<i32>,
    },

    #[error("not a git worktree: {}", .path.display())]
    NoRepository { path: PathBuf },

    #[error("nothing to abort")]
    NothingToAbort,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl GitError {
    pub fn command_failed(command: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code,
        }
    }

    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    /// Exit code of the failed command, when the failure came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } | Self::PatchFailed { exit_code, .. } => {
                *exit_code
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = GitError::command_failed("git status -z", Some(128));
        assert_eq!(err.to_string(), "git status -z error=128");
        assert_eq!(err.exit_code(), Some(128));
    }

    #[test]
    fn test_command_killed_by_signal() {
        let err = GitError::command_failed("git ls-files -z", None);
        assert_eq!(err.to_string(), "git ls-files -z error=signal");
    }

    #[test]
    fn test_patch_failed_display() {
        let err = GitError::PatchFailed {
            command: "git apply -p0 -".to_string(),
            exit_code: Some(1),
        };
        assert!(err.to_string().contains("could not apply patch"));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "git not found");
        let err: GitError = io_err.into();
        assert!(err.to_string().contains("git not found"));
        assert_eq!(err.exit_code(), None);
    }
}
