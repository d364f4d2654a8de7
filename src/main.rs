use clap::Parser;
use color_eyre::eyre::Result;
use log::{debug, info};
use std::sync::Arc;

use vgit::config::{Args, Config};
use vgit::git::{FileEntry, NoticeReceiver, StatusView, discover_worktree, notice_channel};
use vgit::logging;
use vgit::shared_state::CommandLog;

include!(concat!(env!("OUT_DIR"), "/git_sha.rs"));

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("vgit version {} (git: {GIT_SHA})", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load()?;
    let final_config = config.merge_with_args(&args);

    logging::init_logging(final_config.debug.unwrap_or(false))?;
    color_eyre::install()?;

    let start_dir = match &args.path {
        Some(path) => std::fs::canonicalize(path)?,
        None => std::env::current_dir()?,
    };
    info!("Starting vgit in directory: {start_dir:?}");
    debug!("Debug mode enabled");

    let root = std::fs::canonicalize(discover_worktree(&start_dir)?)?;

    let log = Arc::new(CommandLog::new());
    let (notices, mut notice_rx) = notice_channel();
    let root_view = StatusView::open(
        root.clone(),
        final_config.view_config(),
        Arc::clone(&log),
        notices,
    )?;

    // started below the top level: list that directory, with the top as parent
    let view = if start_dir == root {
        Arc::clone(&root_view)
    } else {
        root_view.spawn_reload().await?;
        root_view.child(&FileEntry::with_kind(start_dir, &root, true))
    };

    view.spawn_reload().await?;

    println!("{}{}", view.status_line(), view.name());
    for entry in view.rows() {
        let status = view.status_of(&entry);
        println!(
            "{:<40} {:>2} {:<12} {:>10} {:>10}",
            entry.display_name(),
            status.code,
            status.label(),
            status.unstaged.as_deref().unwrap_or(""),
            status.staged.as_deref().unwrap_or(""),
        );
    }

    for (query, error) in view.shared_state().get_all_errors() {
        eprintln!("{query}: {error}");
    }
    drain_notices(&mut notice_rx);

    if args.show_log {
        for record in log.entries() {
            println!("[{}] {}", record.view, record.command);
            for line in record.output.split(['\n', '\0']).filter(|l| !l.is_empty()) {
                println!("    {line}");
            }
        }
    }

    Ok(())
}

fn drain_notices(rx: &mut NoticeReceiver) {
    while let Ok(notice) = rx.try_recv() {
        eprintln!("{notice}");
    }
}
