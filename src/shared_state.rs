use scc::HashMap;
use scc::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::git::StatusSnapshot;

const CURRENT: &str = "current";

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// State one status view shares between its reload tasks and its readers.
pub struct ViewSharedState {
    /// Last published snapshot
    snapshot: HashMap<String, Arc<StatusSnapshot>>,

    /// Most recently started reload cycle
    started_cycle: AtomicU64,
    last_update: AtomicU64,

    /// Per-query error state, keyed by git subcommand
    error_state: HashMap<String, String>,
}

impl ViewSharedState {
    pub fn new() -> Self {
        Self {
            snapshot: HashMap::new(),
            started_cycle: AtomicU64::new(0),
            last_update: AtomicU64::new(0),
            error_state: HashMap::new(),
        }
    }

    /// Start a new reload cycle and return its number.
    pub fn begin_cycle(&self) -> u64 {
        self.started_cycle.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_cycle(&self) -> u64 {
        self.started_cycle.load(Ordering::SeqCst)
    }

    /// Publish a finished cycle's snapshot.
    ///
    /// Returns false, leaving the current snapshot in place, when a newer cycle
    /// has started or already published.
    pub fn publish(&self, snapshot: StatusSnapshot) -> bool {
        if snapshot.cycle != self.latest_cycle() {
            return false;
        }

        let published = match self.snapshot.entry(CURRENT.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().cycle < snapshot.cycle {
                    *entry.get_mut() = Arc::new(snapshot);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert_entry(Arc::new(snapshot));
                true
            }
        };

        if published {
            self.last_update.store(now_secs(), Ordering::Relaxed);
        }
        published
    }

    /// Current snapshot, or an empty one before the first reload completes.
    pub fn get_snapshot(&self) -> Arc<StatusSnapshot> {
        self.snapshot
            .read(CURRENT, |_, v| Arc::clone(v))
            .unwrap_or_default()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.contains(CURRENT)
    }

    pub fn get_last_update(&self) -> u64 {
        self.last_update.load(Ordering::Relaxed)
    }

    pub fn set_error(&self, key: String, error: String) {
        let _ = self.error_state.remove(&key);
        let _ = self.error_state.insert(key, error);
    }

    pub fn clear_error(&self, key: &str) -> bool {
        self.error_state.remove(key).is_some()
    }

    pub fn get_error(&self, key: &str) -> Option<String> {
        self.error_state.read(key, |_, v| v.clone())
    }

    pub fn get_all_errors(&self) -> Vec<(String, String)> {
        let mut errors = Vec::new();
        self.error_state.scan(|k, v| {
            errors.push((k.clone(), v.clone()));
        });
        errors.sort();
        errors
    }
}

impl Default for ViewSharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// One git invocation as recorded in the command log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub seq: u64,
    /// Name of the view that issued the command
    pub view: String,
    pub command: String,
    pub output: String,
}

/// Records kept before the oldest are dropped.
pub const MAX_RECORDS: usize = 1000;
/// Bytes of output kept per record.
pub const MAX_OUTPUT: usize = 64 * 1024;

const TRUNCATED: &str = "\n[output truncated]";

/// The most recent git commands of this session, owned by whoever creates the
/// root view.
pub struct CommandLog {
    entries: HashMap<u64, CommandRecord>,
    next_seq: AtomicU64,
    max_records: usize,
    max_output: usize,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::with_limits(MAX_RECORDS, MAX_OUTPUT)
    }

    pub fn with_limits(max_records: usize, max_output: usize) -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: AtomicU64::new(0),
            max_records: max_records.max(1),
            max_output,
        }
    }

    /// Bytes of output a single record keeps.
    pub fn max_output(&self) -> usize {
        self.max_output
    }

    pub fn record(&self, view: &str, command: &str, output: String) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let _ = self.entries.insert(
            seq,
            CommandRecord {
                seq,
                view: view.to_string(),
                command: command.to_string(),
                output: truncate_output(output, self.max_output),
            },
        );

        if self.entries.len() > self.max_records {
            let cutoff = seq.saturating_sub(self.max_records as u64);
            self.entries.retain(|k, _| *k > cutoff);
        }
        seq
    }

    /// All records in the order they were issued.
    pub fn entries(&self) -> Vec<CommandRecord> {
        let mut records = Vec::new();
        self.entries.scan(|_, v| {
            records.push(v.clone());
        });
        records.sort_by_key(|r| r.seq);
        records
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Cut `output` to at most `max` bytes on a char boundary, marking the cut.
fn truncate_output(mut output: String, max: usize) -> String {
    if output.len() <= max {
        return output;
    }
    let mut end = max;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    output.truncate(end);
    output.push_str(TRUNCATED);
    output
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn snapshot(cycle: u64, branch: &str) -> StatusSnapshot {
        StatusSnapshot {
            cycle,
            branch: branch.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_state_has_default_snapshot() {
        let state = ViewSharedState::new();
        assert!(!state.has_snapshot());
        assert_eq!(state.get_snapshot().cycle, 0);
        assert!(state.get_snapshot().rows.is_empty());
    }

    #[test]
    fn test_publish_current_cycle() {
        let state = ViewSharedState::new();
        let cycle = state.begin_cycle();
        assert!(state.publish(snapshot(cycle, "main")));
        assert_eq!(state.get_snapshot().branch, "main");
        assert!(state.get_last_update() > 0);
    }

    #[test]
    fn test_stale_cycle_is_discarded() {
        let state = ViewSharedState::new();
        let first = state.begin_cycle();
        let second = state.begin_cycle();

        assert!(state.publish(snapshot(second, "second")));
        assert!(!state.publish(snapshot(first, "first")));
        assert_eq!(state.get_snapshot().branch, "second");
    }

    #[test]
    fn test_older_cycle_finishing_first_is_discarded() {
        let state = ViewSharedState::new();
        let first = state.begin_cycle();
        let _second = state.begin_cycle();

        assert!(!state.publish(snapshot(first, "first")));
        assert!(!state.has_snapshot());
    }

    #[test]
    fn test_error_state() {
        let state = ViewSharedState::new();
        state.set_error("status".to_string(), "git status error=128".to_string());
        state.set_error("status".to_string(), "git status error=1".to_string());
        assert_eq!(state.get_error("status").unwrap(), "git status error=1");
        assert_eq!(state.get_all_errors().len(), 1);
        assert!(state.clear_error("status"));
        assert!(!state.clear_error("status"));
    }

    #[test]
    fn test_command_log_keeps_issue_order() {
        let log = CommandLog::new();
        log.record("repo/a", "git ls-files -z", "a.txt".to_string());
        log.record("repo/a", "git status -z", String::new());
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command, "git ls-files -z");
        assert_eq!(entries[1].command, "git status -z");
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_command_log_drops_oldest_records() {
        let log = CommandLog::with_limits(3, MAX_OUTPUT);
        for i in 0..5 {
            log.record("repo", &format!("git cmd {i}"), String::new());
        }
        let commands: Vec<String> = log.entries().into_iter().map(|r| r.command).collect();
        assert_eq!(commands, vec!["git cmd 2", "git cmd 3", "git cmd 4"]);
    }

    #[test]
    fn test_command_log_truncates_long_output() {
        let log = CommandLog::with_limits(10, 8);
        log.record("repo", "git status -z", "short".to_string());
        log.record("repo", "git ls-files -z", "0123456789abcdef".to_string());
        log.record("repo", "git log", "ééééé".to_string());

        let entries = log.entries();
        assert_eq!(entries[0].output, "short");
        assert_eq!(entries[1].output, "01234567\n[output truncated]");
        assert_eq!(entries[2].output, "éééé\n[output truncated]");
    }

    #[test]
    fn test_command_log_concurrent_records() {
        let log = Arc::new(CommandLog::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for j in 0..25 {
                        log.record("view", &format!("git cmd {i} {j}"), String::new());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 100);
        assert!(entries.windows(2).all(|w| w[0].seq < w[1].seq));
    }
}
