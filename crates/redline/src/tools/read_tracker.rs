//! Read-before-write bookkeeping for the current turn.
//!
//! [`InspectedSet`] records which paths the agent has seen this turn, either
//! by reading them, by writing them, or because they were already open in
//! the editor when the turn began. `write_file` refuses to overwrite an
//! existing file whose path is not in the set.
//!
//! [`ReadCache`] keeps the content returned by each `read_file` so a second
//! read of the same path can be answered with a reuse hint instead of the
//! full text.

use super::path::normalize_path;
use std::collections::{HashMap, HashSet};

/// Paths the agent may overwrite this turn.
#[derive(Debug, Default)]
pub struct InspectedSet {
    paths: HashSet<String>,
}

impl InspectedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a path as inspected. Returns `false` if it already was.
    pub fn insert(&mut self, path: &str) -> bool {
        self.paths.insert(normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(&normalize_path(path))
    }

    /// Replace the contents with `paths`, e.g. the files open at turn start.
    pub fn reset<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.paths.clear();
        for path in paths {
            self.insert(path.as_ref());
        }
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Content returned by `read_file`, keyed by normalized path.
#[derive(Debug, Default)]
pub struct ReadCache {
    entries: HashMap<String, String>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(&normalize_path(path)).map(String::as_str)
    }

    pub fn insert(&mut self, path: &str, content: impl Into<String>) {
        self.entries.insert(normalize_path(path), content.into());
    }

    /// Forget a path whose on-disk content changed.
    pub fn invalidate(&mut self, path: &str) {
        self.entries.remove(&normalize_path(path));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_set_is_empty() {
        let set = InspectedSet::new();
        assert!(set.is_empty());
        assert!(!set.contains("src/main.rs"));
    }

    #[test]
    fn insert_normalizes_spelling() {
        let mut set = InspectedSet::new();
        assert!(set.insert(".\\src\\main.rs"));
        assert!(set.contains("src/main.rs"));
        assert!(!set.insert("./src/main.rs"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn reset_seeds_from_open_files() {
        let mut set = InspectedSet::new();
        set.insert("stale.rs");
        set.reset(["open/a.rs", "./open/b.rs"]);
        assert!(!set.contains("stale.rs"));
        assert!(set.contains("open/a.rs"));
        assert!(set.contains("open/b.rs"));
    }

    #[test]
    fn cache_round_trip_and_invalidate() {
        let mut cache = ReadCache::new();
        cache.insert("./lib.rs", "pub mod a;");
        assert_eq!(cache.get("lib.rs"), Some("pub mod a;"));
        cache.invalidate("lib.rs");
        assert!(cache.get("lib.rs").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_insert_overwrites() {
        let mut cache = ReadCache::new();
        cache.insert("a", "one");
        cache.insert("a", "two");
        assert_eq!(cache.get("a"), Some("two"));
        assert_eq!(cache.len(), 1);
    }
}
