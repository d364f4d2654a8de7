pub mod branch;
pub mod operations;
pub mod runner;
pub mod status;
pub mod stream;
pub mod types;
pub mod worker;

pub use branch::{BranchDeltas, BranchStatus};
pub use operations::discover_worktree;
pub use runner::{CommandOutput, GitRunner, GitStream, Notice, NoticeReceiver, NoticeSender, notice_channel};
pub use status::StatusCache;
pub use types::*;
pub use worker::StatusView;
