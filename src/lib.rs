// Library interface for vgit (live git status views)
// This exposes modules for integration testing

pub mod actions;
pub mod config;
pub mod error;
pub mod git;
pub mod logging;
pub mod shared_state;

pub use actions::{Action, ActionArgs, ActionTable};
pub use config::ViewConfig;
pub use error::GitError;
pub use git::{FileEntry, FileStatus, Notice, StatusCode, StatusSnapshot, StatusView};
pub use shared_state::{CommandLog, CommandRecord, ViewSharedState};
