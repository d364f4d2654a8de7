mod common;

use common::*;
use vgit::git::{FileEntry, Notice};
use vgit::{Action, ActionArgs, ActionTable, ViewConfig};

#[tokio::test]
async fn test_dispatch_add_then_commit() {
    let (temp_dir, repo) = create_test_repo();
    create_commit(&repo, &[("a.txt", "a\n")], "initial");
    write_file(temp_dir.path(), "new.txt", "n\n");

    let (view, _rx, _log) = open_view(temp_dir.path(), ViewConfig::default());
    let table = ActionTable::new();
    let entry = FileEntry::new(temp_dir.path().join("new.txt"), temp_dir.path());

    table
        .dispatch(Action::Add, view.clone(), ActionArgs::row(entry))
        .await
        .unwrap();
    assert_eq!(view.snapshot().status_of("new.txt").label(), "add");

    table
        .dispatch(Action::Commit, view.clone(), ActionArgs::input("add new.txt"))
        .await
        .unwrap();
    assert_eq!(view.snapshot().status_of("new.txt").code.as_string(), "  ");
    assert_eq!(view.git_exec("log -1 --format=%s").await, vec!["add new.txt"]);
}

#[tokio::test]
async fn test_dispatch_selected_rows() {
    let (temp_dir, repo) = create_test_repo();
    create_commit(&repo, &[("a.txt", "a\n")], "initial");
    write_file(temp_dir.path(), "x.txt", "x\n");
    write_file(temp_dir.path(), "y.txt", "y\n");

    let (view, _rx, _log) = open_view(temp_dir.path(), ViewConfig::default());
    let rows = ["x.txt", "y.txt"]
        .iter()
        .map(|name| FileEntry::new(temp_dir.path().join(name), temp_dir.path()))
        .collect();

    ActionTable::new()
        .dispatch(Action::AddSelected, view.clone(), ActionArgs::rows(rows))
        .await
        .unwrap();

    let snapshot = view.snapshot();
    assert_eq!(snapshot.status_of("x.txt").code.as_string(), "A ");
    assert_eq!(snapshot.status_of("y.txt").code.as_string(), "A ");
}

#[tokio::test]
async fn test_dispatch_move_renames_file() {
    let (temp_dir, repo) = create_test_repo();
    create_commit(&repo, &[("old.txt", "content\n")], "initial");

    let (view, _rx, _log) = open_view(temp_dir.path(), ViewConfig::default());
    let entry = FileEntry::new(temp_dir.path().join("old.txt"), temp_dir.path());

    ActionTable::new()
        .dispatch(
            Action::Move,
            view.clone(),
            ActionArgs::row(entry).with_input("renamed.txt"),
        )
        .await
        .unwrap();

    assert!(temp_dir.path().join("renamed.txt").exists());
    let names = row_names(&view);
    assert!(names.contains(&"renamed.txt".to_string()));
    assert!(!names.contains(&"old.txt".to_string()));
}

#[tokio::test]
async fn test_dispatch_missing_arguments() {
    let (temp_dir, repo) = create_test_repo();
    create_commit(&repo, &[("a.txt", "a\n")], "initial");

    let (view, _rx, log) = open_view(temp_dir.path(), ViewConfig::default());
    let table = ActionTable::new();

    let err = table
        .dispatch(Action::Add, view.clone(), ActionArgs::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "git-add needs a row");

    let err = table
        .dispatch(Action::Commit, view.clone(), ActionArgs::input(""))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "git-commit needs input");

    assert!(log.is_empty());
}

#[tokio::test]
async fn test_spawned_action_reports_errors_as_notices() {
    let (temp_dir, repo) = create_test_repo();
    create_commit(&repo, &[("a.txt", "a\n")], "initial");

    let (view, mut rx, _log) = open_view(temp_dir.path(), ViewConfig::default());
    let handle = ActionTable::new()
        .spawn(Action::Abort, view.clone(), ActionArgs::default())
        .unwrap();
    handle.await.unwrap();

    assert_eq!(drain(&mut rx), vec!["nothing to abort"]);
}

#[tokio::test]
async fn test_dispatch_force_and_exec() {
    let (temp_dir, repo) = create_test_repo();
    create_commit(&repo, &[("a.txt", "a\n")], "initial");
    let branch = current_branch(&repo);

    let (view, mut rx, _log) = open_view(temp_dir.path(), ViewConfig::default());
    let table = ActionTable::new();

    table
        .dispatch(Action::Force, view.clone(), ActionArgs::default())
        .await
        .unwrap();
    assert_eq!(view.take_pending_args(), vec!["--force"]);

    table
        .dispatch(
            Action::Exec,
            view.clone(),
            ActionArgs::input("rev-parse --abbrev-ref HEAD"),
        )
        .await
        .unwrap();

    let notices: Vec<Notice> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(notices.len(), 2);
    match &notices[1] {
        Notice::Detail { title, lines } => {
            assert_eq!(title, "git rev-parse --abbrev-ref HEAD");
            assert_eq!(lines, &vec![branch]);
        }
        other => panic!("expected detail block, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dispatch_ignore_wildcard() {
    let (temp_dir, repo) = create_test_repo();
    create_commit(&repo, &[("a.txt", "a\n")], "initial");
    write_file(temp_dir.path(), "build.tmp", "t\n");

    let (view, _rx, _log) = open_view(temp_dir.path(), ViewConfig::default());
    ActionTable::new()
        .dispatch(Action::IgnoreWildcard, view.clone(), ActionArgs::input("*.tmp"))
        .await
        .unwrap();

    assert!(!row_names(&view).contains(&"build.tmp".to_string()));
    assert!(row_names(&view).contains(&".gitignore".to_string()));
}
