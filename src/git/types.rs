use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// One entry of the working tree as shown in a status view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Path relative to the repository root, `/`-separated.
    pub filename: String,
    pub is_dir: bool,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>, root: &Path) -> Self {
        let path = path.into();
        let is_dir = path.is_dir();
        Self::with_kind(path, root, is_dir)
    }

    pub fn with_kind(path: impl Into<PathBuf>, root: &Path, is_dir: bool) -> Self {
        let path = path.into();
        let filename = relative_name(&path, root);
        Self {
            path,
            filename,
            is_dir,
        }
    }

    /// Name as displayed in the path column; directories get a trailing `/`.
    pub fn display_name(&self) -> String {
        if self.is_dir {
            format!("{}/", self.filename)
        } else {
            self.filename.clone()
        }
    }

    /// `/` for directories, otherwise the file extension with its dot.
    pub fn kind(&self) -> String {
        if self.is_dir {
            return "/".to_string();
        }
        self.path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }

    pub fn size(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }

    pub fn modified(&self) -> Option<DateTime<Local>> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from)
    }

    /// True when this entry lies inside `dir` (a root-relative directory, `""` for the root).
    pub fn is_within(&self, dir: &str) -> bool {
        dir.is_empty()
            || self
                .filename
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Root-relative, `/`-joined form of `path`. Paths outside `root` keep their full form.
pub fn relative_name(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::RootDir => Some(String::new()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Which numstat query a record or delta came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffSide {
    /// `diff-files`: working tree against the index.
    Unstaged,
    /// `diff-index --cached HEAD`: index against the current commit.
    Staged,
}

/// Two-character porcelain status, or the reason none is known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Known([char; 2]),
    /// The status query returned something without the `XY ` prefix.
    Malformed,
    /// Only a numstat query has mentioned this path so far.
    Pending(DiffSide),
    /// None of the queries mentioned this path, e.g. a tracked directory.
    Unknown,
}

impl StatusCode {
    pub const CLEAN: StatusCode = StatusCode::Known([' ', ' ']);
    pub const UNTRACKED: StatusCode = StatusCode::Known(['?', '?']);
    pub const IGNORED: StatusCode = StatusCode::Known(['!', '!']);

    pub fn from_chars(code: &str) -> Option<Self> {
        let mut chars = code.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(x), Some(y), None) => Some(StatusCode::Known([x, y])),
            _ => None,
        }
    }

    /// Staged and working-tree characters; sentinel states map to `//`,
    /// `##` and `$$`, a path with no record to two blanks.
    pub fn chars(&self) -> [char; 2] {
        match self {
            StatusCode::Known(code) => *code,
            StatusCode::Malformed => ['/', '/'],
            StatusCode::Pending(DiffSide::Unstaged) => ['#', '#'],
            StatusCode::Pending(DiffSide::Staged) => ['$', '$'],
            StatusCode::Unknown => [' ', ' '],
        }
    }

    pub fn as_string(&self) -> String {
        self.chars().iter().collect()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.as_string())
    }
}

/// Reconciled state of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub code: StatusCode,
    /// `+adds/-dels` between index and working tree.
    pub unstaged: Option<String>,
    /// `+adds/-dels` between HEAD and index.
    pub staged: Option<String>,
}

impl FileStatus {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            unstaged: None,
            staged: None,
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.code == StatusCode::IGNORED
    }

    pub fn is_untracked(&self) -> bool {
        self.code == StatusCode::UNTRACKED
    }

    /// Short human label for the status column.
    pub fn label(&self) -> String {
        let [x, y] = self.code.chars();
        match (x, y) {
            ('?', '?') => "new".to_string(),
            ('!', '!') => "ignored".to_string(),
            (x, ' ') if x != ' ' => change_label(x),
            (_, y) if y != ' ' => change_label(y),
            _ => String::new(),
        }
    }
}

fn change_label(c: char) -> String {
    match c {
        'A' => "add".to_string(),
        'D' => "remove".to_string(),
        'M' => "modify".to_string(),
        'T' => "mode-change".to_string(),
        'U' => "unmerged".to_string(),
        other => other.to_string(),
    }
}

/// A contiguous region of one file's diff, as produced by a diff parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub start: usize,
    pub count: usize,
    /// Literal diff lines, including any file headers the patch needs.
    pub lines: Vec<String>,
}

impl Hunk {
    pub fn new(start: usize, count: usize, lines: Vec<String>) -> Self {
        Self {
            start,
            count,
            lines,
        }
    }

    /// Patch text fed to `git apply`: the lines joined by newlines, newline-terminated.
    pub fn patch_body(&self) -> String {
        let mut body = self.lines.join("\n");
        body.push('\n');
        body
    }

    pub fn line_range(&self) -> (usize, usize) {
        (self.start, self.start + self.count)
    }
}

/// A multi-step operation the repository is in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOperation {
    Rebasing,
    Applying,
    CherryPicking,
    Merging,
    Bisecting,
}

impl RepoOperation {
    pub fn label(&self) -> &'static str {
        match self {
            RepoOperation::Rebasing => "rebasing",
            RepoOperation::Applying => "applying",
            RepoOperation::CherryPicking => "cherry-picking",
            RepoOperation::Merging => "merging",
            RepoOperation::Bisecting => "bisecting",
        }
    }
}

impl fmt::Display for RepoOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything one reload cycle produced, published as a unit.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub cycle: u64,
    pub rows: Vec<FileEntry>,
    pub statuses: HashMap<String, FileStatus>,
    pub branch: String,
    /// Ahead/behind of `branch`, or `no branch` when it has no entry.
    pub remote_delta: String,
    /// Local branch name -> formatted ahead/behind delta.
    pub branches: HashMap<String, String>,
}

impl StatusSnapshot {
    /// Status of a row; rows the queries never mentioned read as `Unknown`.
    pub fn status_of(&self, filename: &str) -> FileStatus {
        self.statuses
            .get(filename)
            .cloned()
            .unwrap_or_else(|| FileStatus::new(StatusCode::Unknown))
    }

    pub fn row_names(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.filename.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: &str) -> FileStatus {
        FileStatus::new(StatusCode::from_chars(code).unwrap())
    }

    #[test]
    fn test_relative_name_uses_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(relative_name(Path::new("/repo/src/main.rs"), root), "src/main.rs");
        assert_eq!(relative_name(Path::new("/repo/README"), root), "README");
    }

    #[test]
    fn test_file_entry_display_and_kind() {
        let root = Path::new("/repo");
        let dir = FileEntry::with_kind("/repo/src", root, true);
        let file = FileEntry::with_kind("/repo/src/lib.rs", root, false);
        let bare = FileEntry::with_kind("/repo/Makefile", root, false);

        assert_eq!(dir.display_name(), "src/");
        assert_eq!(dir.kind(), "/");
        assert_eq!(file.display_name(), "src/lib.rs");
        assert_eq!(file.kind(), ".rs");
        assert_eq!(bare.kind(), "");
    }

    #[test]
    fn test_file_entry_is_within() {
        let root = Path::new("/repo");
        let file = FileEntry::with_kind("/repo/src/lib.rs", root, false);
        assert!(file.is_within(""));
        assert!(file.is_within("src"));
        assert!(!file.is_within("sr"));
        assert!(!file.is_within("docs"));
    }

    #[test]
    fn test_sentinel_codes_render_as_legacy_text() {
        assert_eq!(StatusCode::CLEAN.as_string(), "  ");
        assert_eq!(StatusCode::Malformed.as_string(), "//");
        assert_eq!(StatusCode::Pending(DiffSide::Unstaged).as_string(), "##");
        assert_eq!(StatusCode::Pending(DiffSide::Staged).as_string(), "$$");
        assert_eq!(StatusCode::Unknown.as_string(), "  ");
    }

    #[test]
    fn test_from_chars_requires_exactly_two() {
        assert_eq!(StatusCode::from_chars("M "), Some(StatusCode::Known(['M', ' '])));
        assert_eq!(StatusCode::from_chars("M"), None);
        assert_eq!(StatusCode::from_chars("MMM"), None);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(status("??").label(), "new");
        assert_eq!(status("!!").label(), "ignored");
        assert_eq!(status("A ").label(), "add");
        assert_eq!(status("D ").label(), "remove");
        assert_eq!(status("M ").label(), "modify");
        assert_eq!(status("T ").label(), "mode-change");
        assert_eq!(status("R ").label(), "R");
        assert_eq!(status(" M").label(), "modify");
        assert_eq!(status(" D").label(), "remove");
        assert_eq!(status("MM").label(), "modify");
        assert_eq!(status("UU").label(), "unmerged");
        assert_eq!(status("  ").label(), "");
    }

    #[test]
    fn test_sentinel_labels_show_raw_character() {
        assert_eq!(FileStatus::new(StatusCode::Malformed).label(), "/");
        assert_eq!(
            FileStatus::new(StatusCode::Pending(DiffSide::Unstaged)).label(),
            "#"
        );
        assert_eq!(
            FileStatus::new(StatusCode::Pending(DiffSide::Staged)).label(),
            "$"
        );
        assert_eq!(FileStatus::new(StatusCode::Unknown).label(), "");
    }

    #[test]
    fn test_hunk_patch_body() {
        let hunk = Hunk::new(
            10,
            3,
            vec![
                "--- a.txt".to_string(),
                "+++ a.txt".to_string(),
                "@@ -10,2 +10,3 @@".to_string(),
                " one".to_string(),
                "+two".to_string(),
                " three".to_string(),
            ],
        );
        assert_eq!(
            hunk.patch_body(),
            "--- a.txt\n+++ a.txt\n@@ -10,2 +10,3 @@\n one\n+two\n three\n"
        );
        assert_eq!(hunk.line_range(), (10, 13));
    }

    #[test]
    fn test_snapshot_status_of_unknown_row() {
        let snapshot = StatusSnapshot::default();
        let status = snapshot.status_of("missing");
        assert_eq!(status.code, StatusCode::Unknown);
        assert!(!status.is_untracked());
    }
}
