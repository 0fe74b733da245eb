//! Ordered, path-keyed change set with net-effect merging.

use crate::tools::path::normalize_path;
use indexmap::IndexMap;
use std::fmt;
use tracing::trace;

/// What a turn did to a path, derived from its before/after contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

impl ChangeKind {
    /// `Delete` if the file is gone after the turn, `Create` if it did not
    /// exist before, `Modify` otherwise.
    pub fn derive(before: Option<&str>, after: Option<&str>) -> Self {
        match (before, after) {
            (_, None) => ChangeKind::Delete,
            (None, Some(_)) => ChangeKind::Create,
            (Some(_), Some(_)) => ChangeKind::Modify,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Modify => write!(f, "modify"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// Net change to one path during the current turn.
///
/// `before` is `None` when the path did not exist at turn start; `after`
/// is `None` when it no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: String,
    pub kind: ChangeKind,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl ChangeRecord {
    fn new(path: String, before: Option<String>, after: Option<String>) -> Self {
        let kind = ChangeKind::derive(before.as_deref(), after.as_deref());
        Self {
            path,
            kind,
            before,
            after,
        }
    }
}

/// Both sides missing, or both present with identical text.
fn is_noop(before: Option<&str>, after: Option<&str>) -> bool {
    match (before, after) {
        (None, None) => true,
        (Some(b), Some(a)) => b == a,
        _ => false,
    }
}

/// Reducer over an insertion-ordered map of path to [`ChangeRecord`].
///
/// At most one record exists per path. Insertion order is the diff
/// rendering order; a path that cancels out and is later touched again is
/// re-inserted at the end.
#[derive(Debug, Default)]
pub struct ChangeSetLedger {
    records: IndexMap<String, ChangeRecord>,
}

impl ChangeSetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed transition of `path` from `before` to `after`.
    ///
    /// An existing record keeps its original `before` and takes the new
    /// `after`; the record is removed if the net effect is a no-op.
    pub fn record(&mut self, path: &str, before: Option<&str>, after: Option<&str>) {
        let path = normalize_path(path);

        if let Some(existing) = self.records.get_mut(&path) {
            if is_noop(existing.before.as_deref(), after) {
                trace!("Change to {path} cancelled out");
                self.records.shift_remove(&path);
            } else {
                existing.after = after.map(str::to_string);
                existing.kind = ChangeKind::derive(existing.before.as_deref(), after);
            }
            return;
        }

        if is_noop(before, after) {
            return;
        }
        let record = ChangeRecord::new(
            path.clone(),
            before.map(str::to_string),
            after.map(str::to_string),
        );
        self.records.insert(path, record);
    }

    /// Copy of the current records, in insertion order.
    pub fn snapshot(&self) -> Vec<ChangeRecord> {
        self.records.values().cloned().collect()
    }

    /// Look up the record for a path.
    pub fn get(&self, path: &str) -> Option<&ChangeRecord> {
        self.records.get(&normalize_path(path))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
