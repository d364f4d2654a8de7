//! Per-path status reconciliation.
//!
//! Four independently ordered queries feed one map of [`FileStatus`] records:
//! `ls-files` seeds clean entries, `status` records porcelain codes, and the
//! two numstat queries fill in unstaged and staged deltas. A record is created
//! on first mention and then updated in place, so a record missing some fields
//! is always a valid state to read.

use super::types::{DiffSide, FileEntry, FileStatus, StatusCode};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A `status -z` chunk split into code and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine<'a> {
    pub code: StatusCode,
    pub path: &'a str,
}

/// Parse one `status -z` chunk. Empty chunks yield `None`; chunks without an
/// `XY ` prefix are taken whole as a path with a malformed code.
pub fn parse_status_chunk(chunk: &str) -> Option<StatusLine<'_>> {
    if chunk.is_empty() {
        return None;
    }

    let parsed = (chunk.as_bytes().get(2) == Some(&b' '))
        .then(|| StatusCode::from_chars(&chunk[..2]))
        .flatten();

    let (code, path) = match parsed {
        Some(code) => (code, &chunk[3..]),
        None => (StatusCode::Malformed, chunk),
    };

    // untracked and ignored directories are reported with a trailing slash
    let path = path.strip_suffix('/').unwrap_or(path);
    Some(StatusLine { code, path })
}

/// Splits `status -z` output into records.
///
/// A rename or copy record is followed by a chunk holding the origin path,
/// which is consumed here rather than read as a record of its own.
#[derive(Debug, Default)]
pub struct StatusParser {
    origin_next: bool,
}

impl StatusParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<'a>(&mut self, chunk: &'a str) -> Option<StatusLine<'a>> {
        if std::mem::take(&mut self.origin_next) {
            return None;
        }

        let line = parse_status_chunk(chunk)?;
        if let StatusCode::Known([x, y]) = line.code {
            self.origin_next = matches!(x, 'R' | 'C') || matches!(y, 'R' | 'C');
        }
        Some(line)
    }
}

/// One stat record reassembled from `--numstat -z` chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numstat {
    pub adds: String,
    pub dels: String,
    pub path: String,
}

impl Numstat {
    pub fn delta(&self) -> String {
        format!("+{}/-{}", self.adds, self.dels)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumstatEvent {
    Stat(Numstat),
    /// Waiting for the rest of a rename record
    Pending,
    Skip,
    Mismatch(String),
}

/// Reassembles `--numstat -z` records.
///
/// Plain records are `adds<TAB>dels<TAB>path`. Renames leave the path field
/// empty and follow with two chunks, old path then new path; the stat is
/// attributed to the new path.
#[derive(Debug, Default)]
pub struct NumstatParser {
    rename: Option<(String, String)>,
    old_path: Option<String>,
}

impl NumstatParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> NumstatEvent {
        if let Some((adds, dels)) = self.rename.take() {
            return match self.old_path.take() {
                None => {
                    self.old_path = Some(chunk.to_string());
                    self.rename = Some((adds, dels));
                    NumstatEvent::Pending
                }
                Some(_) => NumstatEvent::Stat(Numstat {
                    adds,
                    dels,
                    path: chunk.to_string(),
                }),
            };
        }

        if chunk.is_empty() {
            return NumstatEvent::Skip;
        }

        let mut fields = chunk.splitn(3, '\t');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(adds), Some(dels), Some("")) => {
                self.rename = Some((adds.to_string(), dels.to_string()));
                NumstatEvent::Pending
            }
            (Some(adds), Some(dels), Some(path)) => NumstatEvent::Stat(Numstat {
                adds: adds.to_string(),
                dels: dels.to_string(),
                path: path.to_string(),
            }),
            _ => NumstatEvent::Mismatch(chunk.to_string()),
        }
    }
}

/// The status records of one reload cycle.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    statuses: HashMap<String, FileStatus>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileStatus> {
        self.statuses.get(path)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, FileStatus> {
        self.statuses
    }

    /// A path from `ls-files`: clean unless something else already said otherwise.
    pub fn seed_tracked(&mut self, path: &str) {
        self.statuses
            .entry(path.to_string())
            .or_insert_with(|| FileStatus::new(StatusCode::CLEAN));
    }

    /// Record a porcelain code from `status`.
    pub fn record_status(&mut self, path: &str, code: StatusCode) {
        self.statuses
            .entry(path.to_string())
            .and_modify(|st| st.code = code)
            .or_insert_with(|| FileStatus::new(code));
    }

    /// Record a numstat delta, seeding a pending record if the path is new.
    pub fn record_numstat(&mut self, side: DiffSide, stat: &Numstat) {
        let status = self
            .statuses
            .entry(stat.path.clone())
            .or_insert_with(|| FileStatus::new(StatusCode::Pending(side)));
        match side {
            DiffSide::Unstaged => status.unstaged = Some(stat.delta()),
            DiffSide::Staged => status.staged = Some(stat.delta()),
        }
    }

    /// Whether `path` should be hidden as ignored.
    pub fn is_ignored(&self, path: &str, show_ignored: bool) -> bool {
        !show_ignored && self.statuses.get(path).is_some_and(FileStatus::is_ignored)
    }
}

/// Total lines in a `+adds/-dels` delta; binary stats (`-`) count as zero.
fn delta_weight(delta: &str) -> u64 {
    delta
        .split('/')
        .map(|part| {
            part.trim_start_matches(['+', '-'])
                .parse::<u64>()
                .unwrap_or(0)
        })
        .sum()
}

/// Default presentation order: largest staged delta first, rows without a
/// staged delta last, ties by path.
pub fn order_rows(rows: &mut [FileEntry], statuses: &HashMap<String, FileStatus>) {
    let weight = |entry: &FileEntry| {
        statuses
            .get(&entry.filename)
            .and_then(|st| st.staged.as_deref())
            .map(delta_weight)
    };

    rows.sort_by(|a, b| match (weight(a), weight(b)) {
        (Some(wa), Some(wb)) => wb.cmp(&wa).then_with(|| a.filename.cmp(&b.filename)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.filename.cmp(&b.filename),
    });
}
