//! Ahead/behind tracking from `git for-each-ref`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Format string for `for-each-ref` producing one line per local branch.
pub const BRANCH_FORMAT: &str = "--format=%(refname:short) %(upstream:short) %(upstream:track)";

// <local> [<upstream>] [[ahead N][, behind M]]
static BRANCH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\S+)(?:\s+([^\s\[]\S*))?(?:\s+\[(?:ahead (\d+))?(?:,\s*)?(?:behind (\d+))?[^\]]*\])?\s*$",
    )
    .expect("branch status pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStatus {
    pub local: String,
    pub upstream: Option<String>,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
}

impl BranchStatus {
    pub fn parse(line: &str) -> Option<Self> {
        let caps = BRANCH_LINE.captures(line)?;
        Some(Self {
            local: caps[1].to_string(),
            upstream: caps.get(2).map(|m| m.as_str().to_string()),
            ahead: caps.get(3).and_then(|m| m.as_str().parse().ok()),
            behind: caps.get(4).and_then(|m| m.as_str().parse().ok()),
        })
    }

    /// `+N`, `-M`, `+N/-M`, or empty when neither count is known.
    pub fn delta(&self) -> String {
        match (self.ahead, self.behind) {
            (Some(ahead), Some(behind)) => format!("+{ahead}/-{behind}"),
            (Some(ahead), None) => format!("+{ahead}"),
            (None, Some(behind)) => format!("-{behind}"),
            (None, None) => String::new(),
        }
    }
}

/// Branch deltas parsed from a batch of `for-each-ref` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchDeltas {
    pub deltas: HashMap<String, String>,
    /// Lines that did not look like branch status and were skipped
    pub unmatched: Vec<String>,
}

impl BranchDeltas {
    pub fn push_line(&mut self, line: &str) {
        match BranchStatus::parse(line) {
            Some(status) => {
                self.deltas.insert(status.local.clone(), status.delta());
            }
            None => self.unmatched.push(line.to_string()),
        }
    }

    pub fn get(&self, branch: &str) -> Option<&str> {
        self.deltas.get(branch).map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for BranchDeltas {
    fn from_iter<I: IntoIterator<Item = S>>(lines: I) -> Self {
        let mut deltas = BranchDeltas::default();
        for line in lines {
            deltas.push_line(line.as_ref());
        }
        deltas
    }
}
