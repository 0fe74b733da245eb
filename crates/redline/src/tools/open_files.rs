//! Editor-side registry of open files.
//!
//! When the agent writes a file that is open in the editor, the registry's
//! in-memory copy is replaced so the change shows up without a reload.
//! Deleting a file closes it. The paths open at turn start count as
//! already inspected for the read-before-write gate.

use super::path::normalize_path;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory view of the files open in an editor.
///
/// Shared between the session and the UI, so implementations use interior
/// mutability.
pub trait OpenFileRegistry: Send + Sync {
    /// Normalized paths of every open file.
    fn open_paths(&self) -> Vec<String>;

    /// In-memory content of an open file.
    fn content(&self, path: &str) -> Option<String>;

    /// Replace the content of `path` if it is open. Unopened paths are
    /// ignored.
    fn update(&self, path: &str, content: &str);

    /// Close `path` if it is open.
    fn close(&self, path: &str);
}

/// Default [`OpenFileRegistry`]: a locked map of path to content.
#[derive(Debug, Default)]
pub struct OpenFiles {
    files: Mutex<BTreeMap<String, String>>,
}

impl OpenFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file tab with the given content.
    pub fn open(&self, path: &str, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(normalize_path(path), content.into());
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&normalize_path(path))
    }
}

impl OpenFileRegistry for OpenFiles {
    fn open_paths(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    fn content(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&normalize_path(path))
            .cloned()
    }

    fn update(&self, path: &str, content: &str) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = files.get_mut(&normalize_path(path)) {
            *existing = content.to_string();
        }
    }

    fn close(&self, path: &str) {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&normalize_path(path));
    }
}
